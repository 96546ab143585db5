//! Turns decoded webhook events into notification messages.
//!
//! Titles are plain text and carry at most [`TITLE_SNIPPET_LEN`] characters of
//! user content, cut before any other processing. Bodies are Markdown: every
//! user-controlled string goes through [`escape_markdown`] before it is
//! interpolated, the `---` rules and labels are ours.

use crate::config::SourceConfig;
use crate::payload::{
    AbuseReport, EventMeta, NotePayload, ReactionPayload, ReportComment, WebhookUser,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt::Write;

pub const TITLE_SNIPPET_LEN: usize = 50;

pub const MISSING_CONTENT: &str = "<missing content>";
pub const NO_COMMENT: &str = "<no comment>";
pub const EMPTY_COMMENT: &str = "<empty comment>";

pub const PAYLOAD_KEY: &str = "misskey::payload";
pub const DISPLAY_KEY: &str = "client::display";
pub const NOTIFICATION_KEY: &str = "client::notification";

/// A fully rendered notification, in the shape the notification host accepts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub title: String,
    /// Markdown body.
    pub message: String,
    pub priority: i64,
    pub extras: Map<String, Value>,
}

impl Message {
    fn new(title: String, body: String, priority: i64, payload: Value, url: Option<String>) -> Self {
        let mut extras = Map::new();
        extras.insert(PAYLOAD_KEY.to_string(), payload);
        extras.insert(
            DISPLAY_KEY.to_string(),
            json!({ "contentType": "text/markdown" }),
        );
        if let Some(url) = url {
            extras.insert(
                NOTIFICATION_KEY.to_string(),
                json!({ "click": { "url": url } }),
            );
        }
        Self {
            title,
            message: body,
            priority,
            extras,
        }
    }

    pub fn click_url(&self) -> Option<&str> {
        self.extras
            .get(NOTIFICATION_KEY)?
            .get("click")?
            .get("url")?
            .as_str()
    }

    pub fn payload(&self) -> Option<&Value> {
        self.extras.get(PAYLOAD_KEY)
    }
}

/// Backslash-escape Markdown metacharacters. The backslash itself is escaped
/// too, so input can never cancel one of our escapes.
pub fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '_' | '*' | '`' | '[' | ']' | '(' | ')') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Keep the first `max_chars` characters, appending `...` if anything was cut.
pub fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &s[..end]),
        None => s.to_string(),
    }
}

fn url_for(meta: &EventMeta, path: &str) -> Option<String> {
    meta.server_base().map(|base| format!("{base}{path}"))
}

fn event_label<'a>(meta: &'a EventMeta, fallback: &'a str) -> &'a str {
    meta.event_type
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or(fallback)
}

/// What a note contributes to a title, in order of preference: the reaction,
/// the content warning (never the text it hides), the text, then whatever the
/// renoted note would show.
fn note_snippet(note: &NotePayload, reaction: Option<&ReactionPayload>) -> String {
    if let Some(reaction) = reaction {
        return reaction.reaction.clone();
    }
    if let Some(cw) = note.cw() {
        return format!("CW: {cw}");
    }
    if let Some(text) = note.text() {
        return text.to_string();
    }
    if let Some(renote) = &note.renote {
        if let Some(cw) = renote.cw() {
            return format!("CW: {cw}");
        }
        if let Some(text) = renote.text() {
            return text.to_string();
        }
    }
    MISSING_CONTENT.to_string()
}

fn write_user_line(out: &mut String, label: &str, user: &WebhookUser) {
    let _ = write!(
        out,
        "{label}: {} ({})\n\n",
        escape_markdown(user.display_name()),
        escape_markdown(&user.username)
    );
}

/// Content of a quoted note: its CW label, else its text, else the placeholder.
fn write_quoted_content(out: &mut String, note: &NotePayload) {
    if let Some(cw) = note.cw() {
        let _ = write!(out, "CW: {}\n\n", escape_markdown(cw));
    } else if let Some(text) = note.text() {
        out.push_str(&escape_markdown(text));
    } else {
        out.push_str(MISSING_CONTENT);
    }
}

/// One `---`-delimited block for a replied-to or renoted note. Only this
/// level is shown; the quoted note's own quotes are not expanded.
fn write_quote(out: &mut String, label: &str, quoted: &NotePayload) {
    out.push_str("\n\n---\n\n");
    let _ = write!(
        out,
        "{label}: {}\n\n",
        escape_markdown(quoted.user.display_name())
    );
    write_quoted_content(out, quoted);
    out.push_str("\n\n---\n\n");
}

fn write_note_body(out: &mut String, note: &NotePayload) {
    write_user_line(out, "Post User", &note.user);

    if let Some(cw) = note.cw() {
        let _ = write!(out, "CW: {}\n\n", escape_markdown(cw));
    } else if let Some(text) = note.text() {
        out.push_str(&escape_markdown(text));
    } else if note.renote.is_none() {
        // A pure renote shows only the quoted note.
        out.push_str(MISSING_CONTENT);
    }

    if let Some(reply) = &note.reply {
        write_quote(out, "Parent", reply);
    }
    if let Some(renote) = &note.renote {
        write_quote(out, "Renote of", renote);
    }
}

/// Note, reply, renote and reaction events.
pub fn render_note(
    meta: &EventMeta,
    source: &SourceConfig,
    note: &NotePayload,
    reaction: Option<&ReactionPayload>,
) -> Message {
    let fallback = if reaction.is_some() { "reaction" } else { "note" };
    let title = format!(
        "[{}] [{}] {}: {}",
        event_label(meta, fallback),
        source.name,
        note.user.user_name_full(),
        truncate(&note_snippet(note, reaction), TITLE_SNIPPET_LEN)
    );

    let mut body = String::new();
    if let Some(reaction) = reaction.filter(|r| !is_known(&r.user)) {
        let _ = write!(body, "Reaction: {}\n\n", escape_markdown(&reaction.reaction));
    } else if let Some(reaction) = reaction {
        let _ = write!(
            body,
            "Reaction from {} ({}): {}\n\n",
            escape_markdown(reaction.user.display_name()),
            escape_markdown(&reaction.user.username),
            escape_markdown(&reaction.reaction)
        );
    }
    write_note_body(&mut body, note);

    let payload = match reaction {
        Some(reaction) => json!({ "note": note, "reaction": reaction }),
        None => json!({ "note": note }),
    };
    let url = url_for(meta, &format!("/notes/{}", note.id));

    Message::new(title, body, source.priority, payload, url)
}

/// User events on the main route (follow, followed, new users, ...).
pub fn render_user(meta: &EventMeta, source: &SourceConfig, user: &WebhookUser) -> Message {
    let handle = user.user_name_full();
    let title = format!(
        "[{}] [{}] {}",
        event_label(meta, "user"),
        source.name,
        handle
    );

    let mut body = String::new();
    write_user_line(&mut body, "User", user);
    let _ = writeln!(body, "Followers: {}", user.followers_count);
    let _ = writeln!(body, "Following: {}", user.following_count);
    let _ = writeln!(body, "Notes: {}", user.notes_count);

    let url = profile_url(meta, user);
    Message::new(title, body, source.priority, json!({ "user": user }), url)
}

/// `/@handle` when the username is known, `/users/{id}` for id-only stubs.
fn profile_url(meta: &EventMeta, user: &WebhookUser) -> Option<String> {
    if !user.username.is_empty() {
        url_for(meta, &format!("/{}", user.user_name_full()))
    } else if !user.id.is_empty() {
        url_for(meta, &format!("/users/{}", user.id))
    } else {
        None
    }
}

/// Events on the dedicated follow route.
pub fn render_follow(meta: &EventMeta, source: &SourceConfig, user: &WebhookUser) -> Message {
    let title = format!(
        "[{}] [{}] {}",
        event_label(meta, "follow"),
        source.name,
        user.user_name_full()
    );

    let mut body = String::new();
    write_user_line(&mut body, "User", user);

    let url = if user.id.is_empty() {
        None
    } else {
        url_for(meta, &format!("/users/{}", user.id))
    };
    Message::new(title, body, source.priority, json!({ "user": user }), url)
}

fn is_known(user: &WebhookUser) -> bool {
    !user.id.is_empty() || !user.username.is_empty()
}

pub fn render_abuse_report(
    meta: &EventMeta,
    source: &SourceConfig,
    report: &AbuseReport,
) -> Message {
    let title = format!("[abuse] [{}] {}", source.name, report.id);

    let mut body = String::new();
    let _ = write!(body, "User: {}\n\n", escape_markdown(&report.id));
    if is_known(&report.reporter) {
        write_user_line(&mut body, "Reporter", &report.reporter);
    }
    if is_known(&report.target_user) {
        write_user_line(&mut body, "Target", &report.target_user);
    }
    match &report.comment {
        ReportComment::Missing => body.push_str(NO_COMMENT),
        ReportComment::Empty => body.push_str(EMPTY_COMMENT),
        ReportComment::Text(comment) => body.push_str(&escape_markdown(comment)),
    }

    let url = url_for(meta, "/admin/abuses");
    Message::new(
        title,
        body,
        source.priority,
        json!({ "abuse_report": report }),
        url,
    )
}
