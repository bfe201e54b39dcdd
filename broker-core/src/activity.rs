use serde_json::Value;

/// Human-readable activity plus any files touched, spec.md §4.7.
pub struct Activity {
    pub human_string: String,
    pub files: Vec<String>,
}

/// Pure inference function; the per-agent mutation happens in `TaskRegistry`.
pub fn infer(tool_name: &str, args: &Value) -> Activity {
    let files = extract_files(args);
    let human_string = match tool_name {
        "get_next_task" => "picking up next task".to_string(),
        "complete_task" => "completing current task".to_string(),
        "create_task" => "creating a task".to_string(),
        "heartbeat" => "idle (heartbeat)".to_string(),
        "read_file" | "view_file" => format!("reading {}", files.first().cloned().unwrap_or_default()),
        "write_file" | "edit_file" | "str_replace" => {
            format!("editing {}", files.first().cloned().unwrap_or_default())
        }
        "run_command" | "execute_command" | "shell" => "running a command".to_string(),
        "search" | "grep" | "search_code" => "searching the codebase".to_string(),
        other => humanize(other),
    };
    Activity { human_string, files }
}

fn humanize(tool_name: &str) -> String {
    let spaced = tool_name.replace(['_', '-'], " ");
    format!("running {spaced}")
}

fn extract_files(args: &Value) -> Vec<String> {
    const FILE_KEYS: &[&str] = &["file_path", "path", "filename", "file_paths", "files"];
    let Some(obj) = args.as_object() else {
        return Vec::new();
    };
    for key in FILE_KEYS {
        if let Some(value) = obj.get(*key) {
            match value {
                Value::String(s) => return vec![s.clone()],
                Value::Array(arr) => {
                    return arr
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect();
                }
                _ => {}
            }
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_tool_produces_readable_string() {
        let activity = infer("write_file", &json!({"file_path": "lib/auth.ex"}));
        assert_eq!(activity.human_string, "editing lib/auth.ex");
        assert_eq!(activity.files, vec!["lib/auth.ex".to_string()]);
    }

    #[test]
    fn unknown_tool_falls_back_to_humanized_name() {
        let activity = infer("some_custom_tool", &json!({}));
        assert_eq!(activity.human_string, "running some custom tool");
        assert!(activity.files.is_empty());
    }

    #[test]
    fn file_paths_array_is_collected() {
        let activity = infer("create_task", &json!({"file_paths": ["a.rs", "b.rs"]}));
        assert_eq!(activity.files, vec!["a.rs".to_string(), "b.rs".to_string()]);
    }
}
