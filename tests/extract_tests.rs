use parley::agent::{extract_agent_data, AgentMessage, AgentResponse, ResponseMetadata};
use parley::types::{AgentToolCall, Usage};
use pretty_assertions::assert_eq;
use serde_json::json;

fn metadata(total: u32) -> Option<ResponseMetadata> {
    Some(ResponseMetadata {
        model: "gpt-4o-mini".into(),
        usage: Usage {
            input_tokens: total - 10,
            output_tokens: 10,
            total_tokens: total,
        },
        finish_reason: None,
    })
}

#[test]
fn last_assistant_text_wins_and_first_tool_call_is_kept() {
    let response = AgentResponse::new(vec![
        AgentMessage::System {
            content: "policy".into(),
        },
        AgentMessage::User {
            content: "send it".into(),
        },
        AgentMessage::Assistant {
            content: "thinking...".into(),
            tool_calls: vec![AgentToolCall {
                id: "call_1".into(),
                name: "send_message".into(),
                arguments: json!({"to": "1555", "text": "first"}),
            }],
            metadata: metadata(100),
        },
        AgentMessage::ToolResult {
            tool_call_id: "call_1".into(),
            tool_name: "send_message".into(),
            content: r#"{"message_id":"42"}"#.into(),
            structured: Some(json!({"message_id": "42"})),
            is_error: false,
        },
        AgentMessage::Assistant {
            content: String::new(),
            tool_calls: vec![AgentToolCall {
                id: "call_2".into(),
                name: "send_message".into(),
                arguments: json!({"to": "1555", "text": "second"}),
            }],
            metadata: metadata(150),
        },
        AgentMessage::Assistant {
            content: "Done, id=42".into(),
            tool_calls: Vec::new(),
            metadata: metadata(200),
        },
    ]);

    let summary = extract_agent_data(&response);
    assert_eq!(summary.final_message.as_deref(), Some("Done, id=42"));
    assert!(summary.success);
    assert_eq!(
        summary.tool_arguments,
        Some(json!({"to": "1555", "text": "first"}))
    );
    assert_eq!(summary.tool_used.as_deref(), Some("send_message"));
    assert_eq!(summary.receipt.message_id.as_deref(), Some("42"));
    assert_eq!(summary.tokens.total, 200);
    assert_eq!(summary.model.as_deref(), Some("gpt-4o-mini"));
}

#[test]
fn missing_fields_never_panic() {
    let response = AgentResponse::new(vec![
        AgentMessage::ToolResult {
            tool_call_id: String::new(),
            tool_name: String::new(),
            content: "plain text, not json".into(),
            structured: None,
            is_error: true,
        },
        AgentMessage::Assistant {
            content: "   ".into(),
            tool_calls: Vec::new(),
            metadata: None,
        },
    ]);

    let summary = extract_agent_data(&response);
    assert_eq!(summary.final_message, None);
    assert_eq!(summary.model, None);
    assert_eq!(summary.tool_result, None);
    assert_eq!(summary.tokens.total, 0);
    assert!(!summary.success);
}

#[test]
fn error_payload_without_id_is_not_success() {
    let response = AgentResponse::new(vec![AgentMessage::ToolResult {
        tool_call_id: "call_1".into(),
        tool_name: "send_message".into(),
        content: String::new(),
        structured: Some(json!({"error": {"message": "Recipient not allowed"}})),
        is_error: false,
    }]);
    let summary = extract_agent_data(&response);
    assert!(!summary.success);
    assert_eq!(
        summary.tool_result,
        Some(json!({"error": {"message": "Recipient not allowed"}}))
    );
}
