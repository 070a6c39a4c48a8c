//! A translator dialect for planner-driven agents.
//!
//! Planners mark the sections of their output with inline markers such as
//! `/*PLANNING*/` or `/*FINAL_ANSWER*/`. This translator keeps the default
//! framing and lifts every marker into a `CUSTOM` event so front-ends can
//! render plans, reasoning and answers differently.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::json;

use crate::error::Result;
use crate::event::InternalEvent;
use crate::input::RunInput;
use crate::translator::{DefaultTranslator, Translator, TranslatorFactory};
use crate::wire::WireEvent;

pub const PLANNER_SECTION_EVENT: &str = "planner.section";

fn section_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r"/\*(PLANNING|REPLANNING|REASONING|ACTION|FINAL_ANSWER)\*/")
            .expect("planner section pattern is valid")
    })
}

pub fn planning_translator_factory() -> TranslatorFactory {
    Arc::new(|input: &RunInput| Box::new(PlanningTranslator::new(input)) as Box<dyn Translator>)
}

pub struct PlanningTranslator {
    inner: DefaultTranslator,
}

impl PlanningTranslator {
    pub fn new(input: &RunInput) -> Self {
        Self {
            inner: DefaultTranslator::new(input),
        }
    }

    fn split_content(message_id: &str, delta: &str, out: &mut Vec<WireEvent>) {
        let mut cursor = 0;
        for captures in section_marker().captures_iter(delta) {
            let (Some(whole), Some(tag)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            if whole.start() > cursor {
                out.push(WireEvent::text_message_content(
                    message_id,
                    &delta[cursor..whole.start()],
                ));
            }
            out.push(WireEvent::custom(
                PLANNER_SECTION_EVENT,
                json!({
                    "messageId": message_id,
                    "section": tag.as_str().to_ascii_lowercase(),
                }),
            ));
            cursor = whole.end();
        }
        if cursor < delta.len() {
            out.push(WireEvent::text_message_content(message_id, &delta[cursor..]));
        }
    }
}

impl Translator for PlanningTranslator {
    fn translate(&mut self, event: &InternalEvent) -> Result<Vec<WireEvent>> {
        let translated = self.inner.translate(event)?;
        let mut events = Vec::with_capacity(translated.len());
        for wire in translated {
            match wire {
                WireEvent::TextMessageContent {
                    ref message_id,
                    ref delta,
                    ..
                } if section_marker().is_match(delta) => {
                    Self::split_content(message_id, delta, &mut events);
                }
                other => events.push(other),
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> PlanningTranslator {
        PlanningTranslator::new(&RunInput::new("t1", "r1"))
    }

    #[test]
    fn lifts_markers_into_custom_events() {
        let mut tr = translator();
        let events = tr
            .translate(&InternalEvent::chunk(
                "m1",
                "/*PLANNING*/1. add numbers/*FINAL_ANSWER*/4",
            ))
            .unwrap();

        let types: Vec<_> = events.iter().map(WireEvent::event_type).collect();
        assert_eq!(
            types,
            vec![
                "TEXT_MESSAGE_START",
                "CUSTOM",
                "TEXT_MESSAGE_CONTENT",
                "CUSTOM",
                "TEXT_MESSAGE_CONTENT"
            ]
        );
        assert_eq!(
            events[1],
            WireEvent::custom(
                PLANNER_SECTION_EVENT,
                json!({"messageId": "m1", "section": "planning"})
            )
        );
        assert_eq!(events[2], WireEvent::text_message_content("m1", "1. add numbers"));
        assert_eq!(events[4], WireEvent::text_message_content("m1", "4"));
    }

    #[test]
    fn plain_text_passes_through() {
        let mut tr = translator();
        let events = tr.translate(&InternalEvent::completion("m1", "plain")).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], WireEvent::text_message_content("m1", "plain"));
    }

    #[test]
    fn completed_messages_are_split_too() {
        let mut tr = translator();
        let events = tr
            .translate(&InternalEvent::completion("m1", "/*REASONING*/why").with_done())
            .unwrap();
        let types: Vec<_> = events.iter().map(WireEvent::event_type).collect();
        assert_eq!(
            types,
            vec![
                "TEXT_MESSAGE_START",
                "CUSTOM",
                "TEXT_MESSAGE_CONTENT",
                "TEXT_MESSAGE_END",
                "RUN_FINISHED"
            ]
        );
    }
}
