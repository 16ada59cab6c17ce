use super::*;
use mcplink_protocols::error::ToolError;
use mcplink_protocols::tool::ToolInvocationResult;

struct StaticTool {
    definition: ToolDefinition,
}

impl StaticTool {
    fn new(id: &str, description: &str) -> Arc<dyn Tool> {
        Arc::new(Self {
            definition: ToolDefinition::new(id, id, description),
        })
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, _params: serde_json::Value) -> Result<ToolInvocationResult, ToolError> {
        Ok(ToolInvocationResult::success("ok"))
    }
}

#[tokio::test]
async fn test_create_and_get() {
    let registry = MemoryToolRegistry::new();
    registry.create("alice", StaticTool::new("t1", "first")).await.unwrap();

    let tool = registry.get("t1").await.unwrap();
    assert_eq!(tool.definition().description, "first");
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_create_duplicate_fails() {
    let registry = MemoryToolRegistry::default();
    registry.create("alice", StaticTool::new("t1", "a")).await.unwrap();
    let err = registry.create("alice", StaticTool::new("t1", "b")).await.unwrap_err();
    assert!(matches!(err, RegistryError::AlreadyExists(_)));
}

#[tokio::test]
async fn test_update_existing() {
    let registry = MemoryToolRegistry::new();
    registry.create("alice", StaticTool::new("t1", "old")).await.unwrap();
    registry.update(StaticTool::new("t1", "new")).await.unwrap();

    let tool = registry.get("t1").await.unwrap();
    assert_eq!(tool.definition().description, "new");
}

#[tokio::test]
async fn test_update_missing_fails() {
    let registry = MemoryToolRegistry::new();
    let err = registry.update(StaticTool::new("ghost", "")).await.unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));
}

#[tokio::test]
async fn test_delete() {
    let registry = MemoryToolRegistry::new();
    registry.create("alice", StaticTool::new("t1", "")).await.unwrap();

    assert!(registry.delete("t1").await.unwrap());
    assert!(!registry.delete("t1").await.unwrap());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_list_by_user() {
    let registry = MemoryToolRegistry::new();
    registry.create("alice", StaticTool::new("a1", "")).await.unwrap();
    registry.create("alice", StaticTool::new("a2", "")).await.unwrap();
    registry.create("bob", StaticTool::new("b1", "")).await.unwrap();

    assert_eq!(registry.list_by_user("alice").await.len(), 2);
    assert_eq!(registry.list_by_user("bob").await.len(), 1);
    assert!(registry.list_by_user("carol").await.is_empty());
    assert_eq!(registry.list().len(), 3);
}
