//! Filesystem tools: `read_file`, `write_file`, `edit_file`, `list_dir`.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{NanobotError, Result};

use super::{Tool, ToolContext};

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| NanobotError::Tool(format!("missing '{}' argument", key)))
}

/// Read file content with optional line offset and limit.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read file content with optional line offset and limit"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path":   {"type": "string", "description": "File path to read"},
                "offset": {"type": "integer", "description": "Line offset (1-based, optional)"},
                "limit":  {"type": "integer", "description": "Max lines to return (optional)"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let path = required_str(&args, "path")?;
        let offset = args.get("offset").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let limit = args.get("limit").and_then(|v| v.as_u64()).unwrap_or(0) as usize;

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| NanobotError::Tool(format!("failed to read file: {}", e)))?;

        let lines: Vec<&str> = content.split('\n').collect();
        let start = offset.saturating_sub(1);
        if start >= lines.len() {
            return Err(NanobotError::Tool(format!(
                "offset {} exceeds file length {}",
                offset,
                lines.len()
            )));
        }
        let end = if limit > 0 {
            (start + limit).min(lines.len())
        } else {
            lines.len()
        };

        let mut out = String::new();
        for (i, line) in lines[start..end].iter().enumerate() {
            out.push_str(&format!("{}\t{}\n", start + i + 1, line));
        }
        Ok(out)
    }
}

/// Write content to a file, creating parent directories as needed.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating parent directories as needed"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path":    {"type": "string", "description": "File path to write"},
                "content": {"type": "string", "description": "Content to write"}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let path = required_str(&args, "path")?;
        let content = required_str(&args, "content")?;

        if let Some(parent) = std::path::Path::new(path).parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| NanobotError::Tool(format!("failed to create directories: {}", e)))?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|e| NanobotError::Tool(format!("failed to write file: {}", e)))?;
        Ok(format!("File written: {}", path))
    }
}

/// Edit a file by replacing an exact text match.
pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit a file by replacing an exact text match with new text"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path":     {"type": "string", "description": "File path to edit"},
                "old_text": {"type": "string", "description": "Exact text to replace"},
                "new_text": {"type": "string", "description": "Replacement text"}
            },
            "required": ["path", "old_text", "new_text"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let path = required_str(&args, "path")?;
        let old_text = required_str(&args, "old_text")?;
        let new_text = required_str(&args, "new_text")?;

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| NanobotError::Tool(format!("failed to read file: {}", e)))?;

        let count = content.matches(old_text).count();
        if count == 0 {
            return Err(NanobotError::Tool("old_text not found in file".into()));
        }
        if count > 1 {
            return Err(NanobotError::Tool(format!(
                "old_text matches {} times, must be unique",
                count
            )));
        }

        let updated = content.replacen(old_text, new_text, 1);
        tokio::fs::write(path, updated)
            .await
            .map_err(|e| NanobotError::Tool(format!("failed to write file: {}", e)))?;
        Ok(format!("File edited: {}", path))
    }
}

/// List directory contents.
pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the entries in a directory"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory path to list"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let path = required_str(&args, "path")?;

        let mut entries = tokio::fs::read_dir(path)
            .await
            .map_err(|e| NanobotError::Tool(format!("failed to read directory: {}", e)))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| NanobotError::Tool(format!("failed to read entry: {}", e)))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            let suffix = match entry.file_type().await {
                Ok(ft) if ft.is_dir() => "/",
                _ => "",
            };
            names.push(format!("{}{}", name, suffix));
        }
        names.sort();
        Ok(names.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_read_file_numbered_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");
        tokio::fs::write(&path, "alpha\nbeta\ngamma").await.unwrap();

        let result = ReadFileTool
            .execute(
                json!({"path": path.to_str().unwrap()}),
                &ToolContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(result, "1\talpha\n2\tbeta\n3\tgamma\n");
    }

    #[tokio::test]
    async fn test_read_file_offset_limit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");
        tokio::fs::write(&path, "a\nb\nc\nd").await.unwrap();

        let result = ReadFileTool
            .execute(
                json!({"path": path.to_str().unwrap(), "offset": 2, "limit": 2}),
                &ToolContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(result, "2\tb\n3\tc\n");
    }

    #[tokio::test]
    async fn test_read_file_offset_out_of_range() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");
        tokio::fs::write(&path, "only").await.unwrap();

        let err = ReadFileTool
            .execute(
                json!({"path": path.to_str().unwrap(), "offset": 10}),
                &ToolContext::new(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exceeds file length"));
    }

    #[tokio::test]
    async fn test_read_file_missing() {
        let err = ReadFileTool
            .execute(json!({"path": "/nonexistent/file"}), &ToolContext::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to read file"));
    }

    #[tokio::test]
    async fn test_write_file_creates_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deep/nested/f.txt");

        let result = WriteFileTool
            .execute(
                json!({"path": path.to_str().unwrap(), "content": "hello"}),
                &ToolContext::new(),
            )
            .await
            .unwrap();
        assert!(result.starts_with("File written: "));
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_edit_file_replaces_unique_match() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");
        tokio::fs::write(&path, "hello world").await.unwrap();

        EditFileTool
            .execute(
                json!({
                    "path": path.to_str().unwrap(),
                    "old_text": "world",
                    "new_text": "rust"
                }),
                &ToolContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            "hello rust"
        );
    }

    #[tokio::test]
    async fn test_edit_file_rejects_ambiguous_match() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");
        tokio::fs::write(&path, "x x").await.unwrap();

        let err = EditFileTool
            .execute(
                json!({"path": path.to_str().unwrap(), "old_text": "x", "new_text": "y"}),
                &ToolContext::new(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("must be unique"));
    }

    #[tokio::test]
    async fn test_edit_file_not_found_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");
        tokio::fs::write(&path, "abc").await.unwrap();

        let err = EditFileTool
            .execute(
                json!({"path": path.to_str().unwrap(), "old_text": "zzz", "new_text": "y"}),
                &ToolContext::new(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_list_dir() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("b.txt"), "").await.unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "").await.unwrap();
        tokio::fs::create_dir(dir.path().join("sub")).await.unwrap();

        let result = ListDirTool
            .execute(
                json!({"path": dir.path().to_str().unwrap()}),
                &ToolContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(result, "a.txt\nb.txt\nsub/");
    }

    #[tokio::test]
    async fn test_missing_required_arg() {
        let err = ReadFileTool
            .execute(json!({}), &ToolContext::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing 'path'"));
    }
}
