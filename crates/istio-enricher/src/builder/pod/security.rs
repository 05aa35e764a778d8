use k8s_openapi::api::core::v1::{Capabilities, SecurityContext};

/// A builder for [`SecurityContext`] objects (not to be confused with `PodSecurityContext`).
#[derive(Clone, Default)]
pub struct SecurityContextBuilder {
    security_context: SecurityContext,
}

impl SecurityContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(&self) -> SecurityContext {
        self.security_context.clone()
    }

    /// Adds a Linux capability, e.g. `NET_ADMIN`.
    pub fn add_capability(&mut self, capability: impl Into<String>) -> &mut Self {
        self.security_context
            .capabilities
            .get_or_insert_with(Capabilities::default)
            .add
            .get_or_insert_with(Vec::new)
            .push(capability.into());
        self
    }

    pub fn privileged(&mut self, value: bool) -> &mut Self {
        self.security_context.privileged = Some(value);
        self
    }

    pub fn read_only_root_filesystem(&mut self, value: bool) -> &mut Self {
        self.security_context.read_only_root_filesystem = Some(value);
        self
    }

    pub fn run_as_user(&mut self, value: i64) -> &mut Self {
        self.security_context.run_as_user = Some(value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_context_builder() {
        let context = SecurityContextBuilder::new()
            .run_as_user(1337)
            .privileged(false)
            .read_only_root_filesystem(false)
            .add_capability("NET_ADMIN")
            .add_capability("NET_RAW")
            .build();

        assert_eq!(
            context,
            SecurityContext {
                run_as_user: Some(1337),
                privileged: Some(false),
                read_only_root_filesystem: Some(false),
                capabilities: Some(Capabilities {
                    add: Some(vec!["NET_ADMIN".to_string(), "NET_RAW".to_string()]),
                    drop: None,
                }),
                ..SecurityContext::default()
            }
        );
    }
}
