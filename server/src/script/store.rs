use crate::error::{DispatchError, Entity, Result};
use crate::store::Store;
use shellfleet_shared::Script;
use std::sync::Arc;
use tracing::info;

/// Scripts are created once and never modified; content is stored verbatim
pub struct ScriptStore {
    store: Arc<dyn Store>,
}

impl ScriptStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Fails with `Conflict` if the name is already taken
    pub async fn create(&self, name: &str, content: &str) -> Result<()> {
        let script = Script {
            name: name.to_string(),
            content: content.to_string(),
        };
        self.store.insert_script(&script).await?;
        info!(script = %name, bytes = content.len(), "Script created");
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Script> {
        self.store
            .script(name)
            .await?
            .ok_or_else(|| DispatchError::not_found(Entity::Script, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_second_create_conflicts_and_keeps_first() {
        let scripts = ScriptStore::new(Arc::new(MemoryStore::new()));
        scripts.create("deploy", "./deploy.sh v1").await.unwrap();

        let err = scripts.create("deploy", "rm -rf /tmp/x").await.unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)));

        let script = scripts.get("deploy").await.unwrap();
        assert_eq!(script.content, "./deploy.sh v1");
    }

    #[tokio::test]
    async fn test_content_stored_verbatim() {
        let scripts = ScriptStore::new(Arc::new(MemoryStore::new()));
        let body = "#!/bin/sh\nset -e\n\techo \"$HOME\" ; exit 0\n";
        scripts.create("odd", body).await.unwrap();
        assert_eq!(scripts.get("odd").await.unwrap().content, body);
    }

    #[tokio::test]
    async fn test_missing_script() {
        let scripts = ScriptStore::new(Arc::new(MemoryStore::new()));
        let err = scripts.get("nope").await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::NotFound {
                entity: Entity::Script,
                ..
            }
        ));
    }
}
