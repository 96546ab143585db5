//! Misskey webhook payload model.
//!
//! Misskey's webhook bodies are loosely typed: most fields may be missing or
//! `null`, users are sometimes a bare id, and notes nest other notes. Decoding
//! here never fails on an optional field; a value of the wrong type is treated
//! as absent. Only the envelope itself and the `id` of notes and abuse reports
//! are required.

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

/// Which push endpoint received the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `/push/misskey/{slug}`: notes, reactions and user events.
    Main,
    /// `/push/misskey/{slug}/follow`
    Follow,
    /// `/push/misskey/{slug}/abuse`
    Abuse,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Main => "main",
            Route::Follow => "follow",
            Route::Abuse => "abuse",
        }
    }
}

// ─── Lenient field decoding ──────────────────────────────────────────────────

/// Decode an optional field, mapping `null` and values of the wrong type to `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

fn lenient_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(lenient(deserializer)?.unwrap_or_default())
}

fn user_ref<'de, D>(deserializer: D) -> Result<WebhookUser, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(WebhookUser::from_value(value).unwrap_or_default())
}

// ─── Users ───────────────────────────────────────────────────────────────────

/// Normalized actor reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookUser {
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub username: String,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub username_lower: String,
    /// Display name.
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    /// `None` or empty for users of the local instance.
    #[serde(default, deserialize_with = "lenient")]
    pub host: Option<String>,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub followers_count: u64,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub following_count: u64,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub notes_count: u64,
}

impl WebhookUser {
    /// Minimal user known only by id.
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: Some(format!("User {id}")),
            username_lower: id.clone(),
            id,
            ..Default::default()
        }
    }

    /// Accept either a bare id string or a user object. Anything else is no user.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(id) => Some(Self::from_id(id)),
            Value::Object(_) => Some(Self::deserialize(value).unwrap_or_default()),
            _ => None,
        }
    }

    /// `@username` for local users, `@username@host` for remote ones.
    pub fn user_name_full(&self) -> String {
        match self.host.as_deref() {
            Some(host) if !host.is_empty() => format!("@{}@{}", self.username, host),
            _ => format!("@{}", self.username),
        }
    }

    /// Display name, falling back to the username when none is set.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.username,
        }
    }
}

// ─── Notes ───────────────────────────────────────────────────────────────────

/// A note and the notes it replies to or renotes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePayload {
    pub id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub cw: Option<String>,
    #[serde(default, deserialize_with = "user_ref")]
    pub user: WebhookUser,
    #[serde(default, deserialize_with = "lenient")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub visibility: Option<String>,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub renote_count: u64,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub replies_count: u64,
    #[serde(default, deserialize_with = "lenient")]
    pub reply_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub renote_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub reply: Option<Box<NotePayload>>,
    #[serde(default, deserialize_with = "lenient")]
    pub renote: Option<Box<NotePayload>>,
}

impl NotePayload {
    /// Note text, ignoring an empty string.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }

    /// Content warning label, ignoring an empty string.
    pub fn cw(&self) -> Option<&str> {
        self.cw.as_deref().filter(|c| !c.is_empty())
    }
}

/// A reaction attached to the note it was made on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionPayload {
    #[serde(default, deserialize_with = "user_ref")]
    pub user: WebhookUser,
    /// Emoji or `:shortcode:`.
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub reaction: String,
}

// ─── Abuse reports ───────────────────────────────────────────────────────────

/// Abuse report comment. `null`/absent and `""` mean different things to a
/// moderator and are kept apart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReportComment {
    #[default]
    Missing,
    Empty,
    Text(String),
}

impl Serialize for ReportComment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ReportComment::Missing => serializer.serialize_none(),
            ReportComment::Empty => serializer.serialize_str(""),
            ReportComment::Text(text) => serializer.serialize_str(text),
        }
    }
}

impl<'de> Deserialize<'de> for ReportComment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match lenient::<_, String>(deserializer)? {
            None => ReportComment::Missing,
            Some(text) if text.is_empty() => ReportComment::Empty,
            Some(text) => ReportComment::Text(text),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbuseReport {
    pub id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub target_user_id: Option<String>,
    #[serde(default, deserialize_with = "user_ref")]
    pub target_user: WebhookUser,
    #[serde(default, deserialize_with = "lenient")]
    pub reporter_id: Option<String>,
    #[serde(default, deserialize_with = "user_ref")]
    pub reporter: WebhookUser,
    #[serde(default)]
    pub comment: ReportComment,
}

// ─── Envelope ────────────────────────────────────────────────────────────────

/// Routing metadata carried next to every webhook body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    /// Base URL of the sending instance.
    #[serde(default, deserialize_with = "lenient")]
    pub server: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient")]
    pub event_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub hook_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub event_id: Option<String>,
    /// Epoch milliseconds.
    #[serde(default, deserialize_with = "lenient")]
    pub created_at: Option<u64>,
}

impl EventMeta {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        let millis = i64::try_from(self.created_at?).ok()?;
        DateTime::from_timestamp_millis(millis)
    }

    /// Server base URL without trailing slashes, if one was sent.
    pub fn server_base(&self) -> Option<&str> {
        self.server
            .as_deref()
            .map(|s| s.trim_end_matches('/'))
            .filter(|s| !s.is_empty())
    }
}

/// Body received on the main route. Which parts are present decides how the
/// event is rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MainBody {
    pub note: Option<NotePayload>,
    pub reaction: Option<ReactionPayload>,
    pub user: Option<WebhookUser>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventBody {
    Main(MainBody),
    /// `None` when the body was neither a user object nor a user id.
    Follow(Option<WebhookUser>),
    AbuseReport(AbuseReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub meta: EventMeta,
    pub body: EventBody,
}

/// Decode a raw webhook request body received on `route`.
pub fn decode(route: Route, raw: &[u8]) -> Result<Envelope, serde_json::Error> {
    let value: Value = serde_json::from_slice(raw)?;
    let Value::Object(mut map) = value else {
        return Err(serde_json::Error::custom("webhook envelope must be a JSON object"));
    };
    let body = map.remove("body").unwrap_or(Value::Null);
    let meta = EventMeta::deserialize(Value::Object(map))?;

    let body = match route {
        Route::Main => EventBody::Main(decode_main(body)?),
        Route::Follow => EventBody::Follow(decode_follow(body)),
        Route::Abuse => EventBody::AbuseReport(AbuseReport::deserialize(body)?),
    };

    Ok(Envelope { meta, body })
}

fn non_null(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !v.is_null())
}

/// Main-route bodies come as `{note, reaction?}`, `{user}`, or, from older
/// Misskey releases, as a bare note object (which carries both `id` and `user`).
fn decode_main(body: Value) -> Result<MainBody, serde_json::Error> {
    let Value::Object(mut map) = body else {
        return Ok(MainBody::default());
    };

    if let Some(note) = non_null(map.remove("note")) {
        let reaction = non_null(map.remove("reaction")).and_then(decode_reaction);
        return Ok(MainBody {
            note: Some(NotePayload::deserialize(note)?),
            reaction,
            user: None,
        });
    }

    if map.contains_key("id") && map.contains_key("user") {
        return Ok(MainBody {
            note: Some(NotePayload::deserialize(Value::Object(map))?),
            ..Default::default()
        });
    }

    Ok(MainBody {
        user: non_null(map.remove("user")).and_then(WebhookUser::from_value),
        ..Default::default()
    })
}

/// A reaction is normally `{user, reaction}`; a bare string is the emoji alone.
fn decode_reaction(value: Value) -> Option<ReactionPayload> {
    match value {
        Value::String(reaction) => Some(ReactionPayload {
            reaction,
            ..Default::default()
        }),
        other => match ReactionPayload::deserialize(other) {
            Ok(reaction) => Some(reaction),
            Err(e) => {
                debug!(error = %e, "dropping undecodable reaction");
                None
            }
        },
    }
}

/// Follow bodies are the user itself, or a `{user}` wrapper.
fn decode_follow(body: Value) -> Option<WebhookUser> {
    match body {
        Value::Object(mut map) if is_user_wrapper(&map) => {
            non_null(map.remove("user")).and_then(WebhookUser::from_value)
        }
        other => WebhookUser::from_value(other),
    }
}

fn is_user_wrapper(map: &Map<String, Value>) -> bool {
    map.contains_key("user") && !map.contains_key("id") && !map.contains_key("username")
}
