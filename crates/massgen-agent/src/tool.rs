// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool call as requested by a backend, before it has been interpreted
/// as one of the closed set of coordination actions below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// The only tools an Agent Runtime exposes to its backend: publish an
/// answer, vote for a peer's answer, or request subagents. There is no
/// open-ended tool registry — coordination is a closed protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinationAction {
    NewAnswer { text: String },
    Vote { target_anon_id: String },
    SpawnSubagents { tasks: Vec<String> },
}

#[derive(Debug, Deserialize)]
struct NewAnswerArgs {
    text: String,
}

#[derive(Debug, Deserialize)]
struct VoteArgs {
    target: String,
}

#[derive(Debug, Deserialize)]
struct SpawnSubagentsArgs {
    tasks: Vec<String>,
}

/// Parse a raw tool call into a `CoordinationAction`, or an error message
/// suitable for returning to the model as the tool's result so it can
/// retry with corrected arguments.
pub fn parse_tool_call(call: &ToolCall) -> Result<CoordinationAction, String> {
    match call.name.as_str() {
        "new_answer" => {
            let args: NewAnswerArgs =
                serde_json::from_value(call.arguments.clone()).map_err(|e| e.to_string())?;
            if args.text.trim().is_empty() {
                return Err("answer text must not be empty".to_string());
            }
            Ok(CoordinationAction::NewAnswer { text: args.text })
        }
        "vote" => {
            let args: VoteArgs =
                serde_json::from_value(call.arguments.clone()).map_err(|e| e.to_string())?;
            if args.target.trim().is_empty() {
                return Err("vote target must not be empty".to_string());
            }
            Ok(CoordinationAction::Vote {
                target_anon_id: args.target,
            })
        }
        "spawn_subagents" => {
            let args: SpawnSubagentsArgs =
                serde_json::from_value(call.arguments.clone()).map_err(|e| e.to_string())?;
            if args.tasks.is_empty() {
                return Err("spawn_subagents requires at least one task".to_string());
            }
            Ok(CoordinationAction::SpawnSubagents { tasks: args.tasks })
        }
        other => Err(format!("unknown tool '{other}'")),
    }
}

/// JSON Schemas for the three coordination tools, offered to the backend
/// on every completion request.
pub fn coordination_tool_schemas() -> Vec<massgen_backend::ToolSchema> {
    vec![
        massgen_backend::ToolSchema {
            name: "new_answer".into(),
            description: "Publish a new or revised final answer for this turn.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "The answer text" }
                },
                "required": ["text"],
                "additionalProperties": false
            }),
        },
        massgen_backend::ToolSchema {
            name: "vote".into(),
            description: "Vote for another agent's published answer by its anonymized id.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "target": { "type": "string", "description": "Anonymized id of the answer's author, e.g. 'agent2'" }
                },
                "required": ["target"],
                "additionalProperties": false
            }),
        },
        massgen_backend::ToolSchema {
            name: "spawn_subagents".into(),
            description: "Request bounded-depth subagents to investigate independent subtasks.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "tasks": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "One task description per subagent"
                    }
                },
                "required": ["tasks"],
                "additionalProperties": false
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall {
            id: "call-1".into(),
            name: name.into(),
            arguments: args,
        }
    }

    #[test]
    fn parses_new_answer() {
        let action = parse_tool_call(&call("new_answer", serde_json::json!({"text": "42"}))).unwrap();
        assert_eq!(
            action,
            CoordinationAction::NewAnswer { text: "42".into() }
        );
    }

    #[test]
    fn rejects_empty_answer_text() {
        let result = parse_tool_call(&call("new_answer", serde_json::json!({"text": "  "})));
        assert!(result.is_err());
    }

    #[test]
    fn parses_vote() {
        let action = parse_tool_call(&call("vote", serde_json::json!({"target": "agent2"}))).unwrap();
        assert_eq!(
            action,
            CoordinationAction::Vote {
                target_anon_id: "agent2".into()
            }
        );
    }

    #[test]
    fn parses_spawn_subagents() {
        let action = parse_tool_call(&call(
            "spawn_subagents",
            serde_json::json!({"tasks": ["research A", "research B"]}),
        ))
        .unwrap();
        assert_eq!(
            action,
            CoordinationAction::SpawnSubagents {
                tasks: vec!["research A".into(), "research B".into()]
            }
        );
    }

    #[test]
    fn unknown_tool_name_is_an_error() {
        let result = parse_tool_call(&call("fs_write", serde_json::json!({})));
        assert!(result.is_err());
    }

    #[test]
    fn schemas_cover_all_three_tools() {
        let schemas = coordination_tool_schemas();
        let names: Vec<&str> = schemas.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["new_answer", "vote", "spawn_subagents"]);
    }
}
