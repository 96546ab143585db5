use crate::config::SourceConfig;
use crate::error::HookError;
use crate::payload::{
    AbuseReport, EventBody, Envelope, NotePayload, ReactionPayload, WebhookUser,
};
use crate::render::{self, Message};
use crate::sink::MessageSink;
use tracing::{debug, info, warn};

/// The rendering rule picked for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rendering<'a> {
    Note {
        note: &'a NotePayload,
        reaction: Option<&'a ReactionPayload>,
    },
    User(&'a WebhookUser),
    Follow(&'a WebhookUser),
    AbuseReport(&'a AbuseReport),
}

impl Rendering<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Rendering::Note { reaction: None, .. } => "note",
            Rendering::Note { .. } => "reaction",
            Rendering::User(_) => "user",
            Rendering::Follow(_) => "follow",
            Rendering::AbuseReport(_) => "abuse_report",
        }
    }
}

/// Pick the renderer for a decoded event. On the main route a note wins over
/// a user; a reaction is only meaningful next to its note.
pub fn select(envelope: &Envelope) -> Result<Rendering<'_>, HookError> {
    match &envelope.body {
        EventBody::Main(body) => {
            if let Some(note) = &body.note {
                Ok(Rendering::Note {
                    note,
                    reaction: body.reaction.as_ref(),
                })
            } else if let Some(user) = &body.user {
                Ok(Rendering::User(user))
            } else {
                Err(HookError::UnknownPayloadShape(format!(
                    "{} event has neither note nor user",
                    envelope.meta.event_type.as_deref().unwrap_or("untyped")
                )))
            }
        }
        EventBody::Follow(Some(user)) => Ok(Rendering::Follow(user)),
        EventBody::Follow(None) => Err(HookError::UnknownPayloadShape(
            "follow event has no user".to_string(),
        )),
        EventBody::AbuseReport(report) => Ok(Rendering::AbuseReport(report)),
    }
}

pub fn render(envelope: &Envelope, source: &SourceConfig) -> Result<Message, HookError> {
    let meta = &envelope.meta;
    let rendering = select(envelope)?;
    debug!(kind = rendering.kind(), "selected renderer");

    Ok(match rendering {
        Rendering::Note { note, reaction } => render::render_note(meta, source, note, reaction),
        Rendering::User(user) => render::render_user(meta, source, user),
        Rendering::Follow(user) => render::render_follow(meta, source, user),
        Rendering::AbuseReport(report) => render::render_abuse_report(meta, source, report),
    })
}

/// Render the event and submit it. Submission is attempted exactly once.
pub async fn dispatch(
    envelope: &Envelope,
    source: &SourceConfig,
    sink: &dyn MessageSink,
) -> Result<(), HookError> {
    let message = render(envelope, source)?;

    if let Err(e) = sink.submit(&message).await {
        warn!(
            slug = %source.slug,
            event_id = envelope.meta.event_id.as_deref().unwrap_or(""),
            error = %e,
            "notification sink rejected message"
        );
        return Err(e.into());
    }

    info!(
        slug = %source.slug,
        event_type = envelope.meta.event_type.as_deref().unwrap_or(""),
        event_id = envelope.meta.event_id.as_deref().unwrap_or(""),
        created_at = ?envelope.meta.created_at_utc(),
        "delivered notification"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::payload::{decode, MainBody, Route};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingSink {
        fail: bool,
        messages: Mutex<Vec<Message>>,
    }

    impl RecordingSink {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                messages: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn submit(&self, message: &Message) -> Result<(), SinkError> {
            self.messages.lock().unwrap().push(message.clone());
            if self.fail {
                return Err(SinkError::Rejected {
                    status: 503,
                    body: "down".to_string(),
                });
            }
            Ok(())
        }
    }

    fn source() -> SourceConfig {
        SourceConfig {
            slug: "s".to_string(),
            name: "Src".to_string(),
            secret: "x".to_string(),
            priority: 2,
        }
    }

    #[test]
    fn note_wins_over_user() {
        let envelope = Envelope {
            meta: Default::default(),
            body: EventBody::Main(MainBody {
                note: Some(NotePayload {
                    id: "n".to_string(),
                    ..Default::default()
                }),
                reaction: None,
                user: Some(WebhookUser::from_id("u")),
            }),
        };
        assert_eq!(select(&envelope).unwrap().kind(), "note");
    }

    #[test]
    fn routes_select_their_renderers() {
        let cases = [
            (Route::Main, r#"{"body":{"note":{"id":"n"}}}"#, "note"),
            (
                Route::Main,
                r#"{"body":{"note":{"id":"n"},"reaction":{"reaction":"👍"}}}"#,
                "reaction",
            ),
            (Route::Main, r#"{"body":{"user":{"id":"u"}}}"#, "user"),
            (Route::Follow, r#"{"body":"u"}"#, "follow"),
            (Route::Abuse, r#"{"body":{"id":"r"}}"#, "abuse_report"),
        ];
        for (route, raw, kind) in cases {
            let envelope = decode(route, raw.as_bytes()).unwrap();
            assert_eq!(select(&envelope).unwrap().kind(), kind, "{raw}");
        }
    }

    #[test]
    fn unknown_shapes_are_rejected() {
        for (route, raw) in [
            (Route::Main, r#"{"type":"note","body":{"something":"else"}}"#),
            (Route::Main, r#"{"type":"note"}"#),
            (Route::Follow, r#"{"body":42}"#),
        ] {
            let envelope = decode(route, raw.as_bytes()).unwrap();
            assert!(matches!(
                select(&envelope),
                Err(HookError::UnknownPayloadShape(_))
            ));
        }
    }

    #[tokio::test]
    async fn dispatch_submits_once() {
        let sink = RecordingSink::new(false);
        let envelope = decode(Route::Main, br#"{"type":"note","body":{"note":{"id":"n","text":"hi"}}}"#)
            .unwrap();
        dispatch(&envelope, &source(), &sink).await.unwrap();

        let messages = sink.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].title, "[note] [Src] @: hi");
        assert_eq!(messages[0].priority, 2);
    }

    #[tokio::test]
    async fn sink_failure_is_not_retried() {
        let sink = RecordingSink::new(true);
        let envelope = decode(Route::Abuse, br#"{"body":{"id":"r"}}"#).unwrap();
        let err = dispatch(&envelope, &source(), &sink).await.unwrap_err();
        assert!(matches!(err, HookError::Delivery(_)));
        assert_eq!(sink.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_shape_never_reaches_sink() {
        let sink = RecordingSink::new(false);
        let envelope = decode(Route::Main, br#"{"body":{}}"#).unwrap();
        assert!(dispatch(&envelope, &source(), &sink).await.is_err());
        assert!(sink.messages.lock().unwrap().is_empty());
    }
}
