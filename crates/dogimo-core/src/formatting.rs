//! Telegram-HTML renderings of the stats report and the help text.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};

use crate::{commands::Commands, stats::StatsSnapshot};

const USER_COL: usize = 15;
const TOKENS_COL: usize = 20;
const NUM_COL: usize = 10;

/// Escape text for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Elapsed {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Elapsed {
    pub fn from_seconds(total: i64) -> Self {
        let total = total.max(0);
        Self {
            days: total / 86_400,
            hours: (total % 86_400) / 3600,
            minutes: (total % 3600) / 60,
            seconds: total % 60,
        }
    }
}

/// Display name for an identity, falling back to the identity itself.
pub fn display_name<'a>(users: &'a BTreeMap<String, String>, identity: &'a str) -> &'a str {
    users.get(identity).map(String::as_str).unwrap_or(identity)
}

/// Monospace per-user table (tokens, cost, queries), one row per identity.
pub fn user_stats_table(snapshot: &StatsSnapshot, users: &BTreeMap<String, String>) -> String {
    let mut table = format!(
        "| {:<USER_COL$} | {:<TOKENS_COL$} | {:<NUM_COL$} | {:<NUM_COL$} |\n",
        "User", "Tokens", "Cost ($)", "Queries"
    );
    table.push_str(&format!(
        "| {} | {} | {} | {} |\n",
        "-".repeat(USER_COL),
        "-".repeat(TOKENS_COL),
        "-".repeat(NUM_COL),
        "-".repeat(NUM_COL)
    ));

    for (identity, s) in &snapshot.counters.per_user {
        let cost = format!("{:.4}", s.cost);
        table.push_str(&format!(
            "| {:<USER_COL$} | {:<TOKENS_COL$} | {:<NUM_COL$} | {:<NUM_COL$} |\n",
            display_name(users, identity.as_str()),
            s.tokens,
            cost,
            s.queries
        ));
    }
    table
}

pub fn render_stats(
    snapshot: &StatsSnapshot,
    version: &str,
    users: &BTreeMap<String, String>,
    now: DateTime<Local>,
) -> String {
    let elapsed = Elapsed::from_seconds(now.signed_duration_since(snapshot.started_at).num_seconds());
    let c = &snapshot.counters;

    format!(
        "📊 <b>Session stats</b>\n\
<b>Session ID:</b> <code>{session}</code>\n\
<b>Version:</b> {version}\n\
<b>Model:</b> {model}\n\
<b>Started:</b> {started}\n\
<b>Uptime:</b> {days} days {h:02}:{m:02}:{s:02}\n\
\n\
<b>Total tokens:</b> {tokens}\n\
<b>Total queries:</b> {queries}\n\
<b>Total cost ($):</b> {total_cost:.4}\n\
<b>Most expensive query ($):</b> {max_cost:.4}\n\
\n\
<b>Usage per user</b>\n\
<pre>{table}</pre>",
        session = escape_html(&snapshot.session_id),
        version = escape_html(version),
        model = escape_html(&snapshot.model),
        started = snapshot.started_at.format("%d/%m/%Y - %H:%M:%S"),
        days = elapsed.days,
        h = elapsed.hours,
        m = elapsed.minutes,
        s = elapsed.seconds,
        tokens = c.total_tokens,
        queries = c.total_queries,
        total_cost = c.total_cost,
        max_cost = c.max_cost,
        table = escape_html(user_stats_table(snapshot, users).trim_end()),
    )
}

pub fn render_help(commands: &Commands) -> String {
    format!(
        "<b>Commands</b>\n\
\n\
<code>{chat} &lt;message&gt;</code>\n\
Ask the bot a question. It answers using the recent conversation as context.\n\
\n\
<code>{stats}</code>\n\
Session information such as uptime, tokens used and total cost.\n\
\n\
<code>{help}</code>\n\
Show the available commands.",
        chat = escape_html(&commands.chat),
        stats = escape_html(&commands.stats),
        help = escape_html(&commands.help),
    )
}
