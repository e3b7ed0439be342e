use futures::future::BoxFuture;

use botflow_core::error::Result;
use botflow_core::traits::MessageSink;
use botflow_core::types::OutboundMessage;

/// Renders outbound messages to stdout. Used by the CLI runner.
#[derive(Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

impl MessageSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn send(&self, _recipient: &str, message: &OutboundMessage) -> BoxFuture<'_, Result<()>> {
        let rendered = render(message);
        Box::pin(async move {
            println!("{}", rendered);
            Ok(())
        })
    }
}

fn render(message: &OutboundMessage) -> String {
    match message {
        OutboundMessage::Text { body } => format!("bot> {}", body),
        OutboundMessage::Buttons { body, buttons } => {
            let mut out = format!("bot> {}", body);
            for button in buttons {
                out.push_str(&format!("\n  [{}] {}", button.id, button.label));
            }
            out
        }
        OutboundMessage::List {
            body,
            button_label,
            sections,
        } => {
            let mut out = format!("bot> {}", body);
            if let Some(label) = button_label {
                out.push_str(&format!(" ({})", label));
            }
            for section in sections {
                out.push_str(&format!("\n  -- {} --", section.title));
                for row in &section.rows {
                    out.push_str(&format!("\n  [{}] {}", row.id, row.title));
                    if let Some(desc) = &row.description {
                        out.push_str(&format!(" — {}", desc));
                    }
                }
            }
            out
        }
        OutboundMessage::Form { form_id, .. } => {
            format!("bot> [form request: {}]", form_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botflow_core::types::ButtonOption;

    #[test]
    fn test_render_buttons() {
        let msg = OutboundMessage::Buttons {
            body: "Proceed?".into(),
            buttons: vec![
                ButtonOption {
                    id: "yes".into(),
                    label: "Yes".into(),
                },
                ButtonOption {
                    id: "no".into(),
                    label: "No".into(),
                },
            ],
        };
        let out = render(&msg);
        assert!(out.contains("Proceed?"));
        assert!(out.contains("[yes] Yes"));
        assert!(out.contains("[no] No"));
    }
}
