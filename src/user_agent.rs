//! Default User-Agent for sessions.

/// Product token sent when neither the session nor the request sets a User-Agent.
#[must_use]
pub fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("reqnorm/{version}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_carries_crate_version() {
        let ua = default_user_agent();
        assert_eq!(
            Some(env!("CARGO_PKG_VERSION")),
            ua.strip_prefix("reqnorm/"),
            "UA must be reqnorm/<version>: {ua}"
        );
    }
}
