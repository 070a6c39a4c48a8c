//! Translation of internal agent events into AG-UI wire events.

use std::sync::Arc;

use crate::error::{AguiError, Result};
use crate::event::{InternalEvent, ObjectKind};
use crate::input::RunInput;
use crate::wire::WireEvent;

/// Per-run encoder from internal events to wire events.
pub trait Translator: Send {
    fn translate(&mut self, event: &InternalEvent) -> Result<Vec<WireEvent>>;
}

/// Builds a fresh translator for every run.
pub type TranslatorFactory = Arc<dyn Fn(&RunInput) -> Box<dyn Translator> + Send + Sync>;

pub fn default_translator_factory() -> TranslatorFactory {
    Arc::new(|input: &RunInput| Box::new(DefaultTranslator::new(input)) as Box<dyn Translator>)
}

/// Mutable state carried between translation calls of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslatorState {
    pub thread_id: String,
    pub run_id: String,
    /// Id of the last message a text or tool-call event was seen for.
    pub last_seen_message_id: String,
}

/// The standard AG-UI translator.
#[derive(Debug, Clone)]
pub struct DefaultTranslator {
    state: TranslatorState,
}

impl DefaultTranslator {
    pub fn new(input: &RunInput) -> Self {
        Self {
            state: TranslatorState {
                thread_id: input.thread_id.clone(),
                run_id: input.run_id.clone(),
                last_seen_message_id: String::new(),
            },
        }
    }

    pub fn state(&self) -> &TranslatorState {
        &self.state
    }

    fn text_message_events(&mut self, event: &InternalEvent) -> Vec<WireEvent> {
        let Some(choice) = event.first_choice() else {
            return Vec::new();
        };
        let mut events = Vec::new();

        if event.id != self.state.last_seen_message_id {
            self.state.last_seen_message_id = event.id.clone();
            match event.object {
                ObjectKind::ChatCompletionChunk => {
                    events.push(WireEvent::text_message_start(
                        &event.id,
                        choice.delta.role,
                    ));
                }
                ObjectKind::ChatCompletion => {
                    // Messages with no text only carry tool calls; they get no
                    // text framing at all.
                    if choice.message.content.is_empty() {
                        return events;
                    }
                    return vec![
                        WireEvent::text_message_start(&event.id, choice.message.role),
                        WireEvent::text_message_content(&event.id, &choice.message.content),
                        WireEvent::text_message_end(&event.id),
                    ];
                }
                _ => {}
            }
        }

        match event.object {
            ObjectKind::ChatCompletionChunk if !choice.delta.content.is_empty() => {
                events.push(WireEvent::text_message_content(
                    &event.id,
                    &choice.delta.content,
                ));
            }
            ObjectKind::ChatCompletion => {
                events.push(WireEvent::text_message_end(&event.id));
            }
            _ => {}
        }
        events
    }

    fn tool_call_events(&mut self, event: &InternalEvent) -> Result<Vec<WireEvent>> {
        let mut events = Vec::new();
        let calls = event
            .first_choice()
            .map(|choice| choice.message.tool_calls.as_slice())
            .unwrap_or_default();
        for call in calls {
            if call.id.is_empty() {
                return Err(AguiError::Translate(format!(
                    "tool call `{}` in message `{}` has no id",
                    call.name, event.id
                )));
            }
            events.push(WireEvent::tool_call_start(
                &call.id,
                &call.name,
                Some(event.id.clone()),
            ));
            if !call.arguments.is_empty() {
                events.push(WireEvent::tool_call_args(&call.id, &call.arguments));
            }
        }
        self.state.last_seen_message_id = event.id.clone();
        Ok(events)
    }

    fn tool_result_events(&self, event: &InternalEvent) -> Vec<WireEvent> {
        let mut events = Vec::new();
        for choice in &event.choices {
            let Some(tool_id) = choice.message.tool_id.as_deref() else {
                continue;
            };
            events.push(WireEvent::tool_call_end(tool_id));
            events.push(WireEvent::tool_call_result(
                &self.state.last_seen_message_id,
                tool_id,
                &choice.message.content,
            ));
        }
        events
    }
}

impl Translator for DefaultTranslator {
    fn translate(&mut self, event: &InternalEvent) -> Result<Vec<WireEvent>> {
        if let Some(error) = &event.error {
            return Ok(vec![WireEvent::run_error(
                &error.message,
                error.code.clone(),
            )]);
        }

        let mut events = Vec::new();
        if matches!(
            event.object,
            ObjectKind::ChatCompletionChunk | ObjectKind::ChatCompletion
        ) {
            events.extend(self.text_message_events(event));
        }
        if event.is_tool_call() {
            events.extend(self.tool_call_events(event)?);
        }
        if event.is_tool_result() {
            events.extend(self.tool_result_events(event));
        }
        if event.is_run_completion() {
            events.push(WireEvent::run_finished(
                &self.state.thread_id,
                &self.state.run_id,
            ));
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ToolCall;

    fn translator() -> DefaultTranslator {
        DefaultTranslator::new(&RunInput::new("t1", "r1"))
    }

    fn types(events: &[WireEvent]) -> Vec<&'static str> {
        events.iter().map(WireEvent::event_type).collect()
    }

    #[test]
    fn completed_message_is_framed_atomically() {
        let mut tr = translator();
        let events = tr
            .translate(&InternalEvent::completion("m1", "hello"))
            .unwrap();

        assert_eq!(
            types(&events),
            vec!["TEXT_MESSAGE_START", "TEXT_MESSAGE_CONTENT", "TEXT_MESSAGE_END"]
        );
        assert_eq!(events[1], WireEvent::text_message_content("m1", "hello"));
        assert_eq!(tr.state().last_seen_message_id, "m1");
    }

    #[test]
    fn streamed_fragments_share_one_start_and_end() {
        let mut tr = translator();
        let mut all = Vec::new();
        for piece in ["he", "", "llo"] {
            all.extend(tr.translate(&InternalEvent::chunk("m1", piece)).unwrap());
        }
        all.extend(tr.translate(&InternalEvent::completion("m1", "hello")).unwrap());

        assert_eq!(
            types(&all),
            vec![
                "TEXT_MESSAGE_START",
                "TEXT_MESSAGE_CONTENT",
                "TEXT_MESSAGE_CONTENT",
                "TEXT_MESSAGE_END"
            ]
        );
        assert!(all.iter().all(|ev| ev.message_id() == Some("m1")));
    }

    #[test]
    fn new_message_id_opens_a_new_message() {
        let mut tr = translator();
        tr.translate(&InternalEvent::chunk("m1", "a")).unwrap();
        tr.translate(&InternalEvent::completion("m1", "a")).unwrap();
        let events = tr.translate(&InternalEvent::chunk("m2", "")).unwrap();

        assert_eq!(types(&events), vec!["TEXT_MESSAGE_START"]);
        assert_eq!(events[0].message_id(), Some("m2"));
    }

    #[test]
    fn tool_only_completion_emits_no_text_framing() {
        let mut tr = translator();
        let event = InternalEvent::tool_calls(
            "m1",
            vec![
                ToolCall::new("c1", "calculator", r#"{"a":1}"#),
                ToolCall::new("c2", "clock", ""),
            ],
        );
        let events = tr.translate(&event).unwrap();

        assert_eq!(
            types(&events),
            vec!["TOOL_CALL_START", "TOOL_CALL_ARGS", "TOOL_CALL_START"]
        );
        assert_eq!(
            events[0],
            WireEvent::tool_call_start("c1", "calculator", Some("m1".into()))
        );
        assert_eq!(events[1], WireEvent::tool_call_args("c1", r#"{"a":1}"#));
    }

    #[test]
    fn tool_results_are_attributed_to_the_requesting_message() {
        let mut tr = translator();
        tr.translate(&InternalEvent::tool_calls(
            "m1",
            vec![ToolCall::new("c1", "calculator", "{}")],
        ))
        .unwrap();
        let events = tr
            .translate(&InternalEvent::tool_result("tr-1", "c1", "calculator", "4"))
            .unwrap();

        assert_eq!(events, vec![
            WireEvent::tool_call_end("c1"),
            WireEvent::tool_call_result("m1", "c1", "4"),
        ]);
    }

    #[test]
    fn errors_short_circuit_without_touching_state() {
        let mut tr = translator();
        tr.translate(&InternalEvent::chunk("m1", "x")).unwrap();
        let events = tr.translate(&InternalEvent::error("m2", "model down")).unwrap();

        assert_eq!(events, vec![WireEvent::run_error("model down", None)]);
        assert_eq!(tr.state().last_seen_message_id, "m1");
    }

    #[test]
    fn final_event_appends_run_finished() {
        let mut tr = translator();
        let events = tr
            .translate(&InternalEvent::completion("m1", "bye").with_done())
            .unwrap();

        assert_eq!(events.last(), Some(&WireEvent::run_finished("t1", "r1")));
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn tool_call_without_id_fails() {
        let mut tr = translator();
        let err = tr
            .translate(&InternalEvent::tool_calls("m1", vec![ToolCall::new("", "calc", "")]))
            .unwrap_err();
        assert!(matches!(err, AguiError::Translate(_)));
    }
}
