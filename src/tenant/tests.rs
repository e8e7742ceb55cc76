#[cfg(test)]
mod tests {
    use crate::executor::registry::ExecutorRegistry;
    use crate::executor::types::ExecutorConfig;
    use crate::tenant::{TenantHost, TokenIssuer};

    #[test]
    fn test_token_is_stable_per_tenant() {
        let issuer = TokenIssuer::new();

        let first = issuer.token("docs");
        let second = issuer.token("docs");
        let other = issuer.token("specs");

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(first.len(), 64, "256 bits, hex encoded");
    }

    #[test]
    fn test_verify_rejects_wrong_and_unissued_tokens() {
        let issuer = TokenIssuer::new();
        let token = issuer.token("docs");

        assert!(issuer.verify("docs", &token));
        assert!(!issuer.verify("docs", "guess"));
        assert!(!issuer.verify("docs", ""));
        assert!(!issuer.verify("specs", &token), "Tokens are not shared across tenants");
    }

    #[test]
    fn test_verify_rejects_near_miss_tokens() {
        let issuer = TokenIssuer::new();
        let token = issuer.token("docs");
        let mut flipped = token.clone().into_bytes();
        flipped[63] = if flipped[63] == b'0' { b'1' } else { b'0' };

        assert!(!issuer.verify("docs", &token[..63]), "Prefix of the token");
        assert!(!issuer.verify("docs", &format!("{}0", token)), "Token with a suffix");
        assert!(!issuer.verify("docs", &String::from_utf8(flipped).unwrap()));
        assert!(!issuer.verify("docs", &token.to_uppercase()));
    }

    #[tokio::test]
    async fn test_tenant_host_issues_token_on_creation() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ExecutorRegistry::new(ExecutorConfig::default());
        let tokens = TokenIssuer::new();
        let executor = registry.get_or_create("docs", dir.path());

        let host = TenantHost::new("docs", 58823, executor, tokens.clone());

        assert!(tokens.verify("docs", &host.token()));
        assert_eq!(host.storage_path(), dir.path());
        assert_eq!(host.port(), 58823);
    }
}
