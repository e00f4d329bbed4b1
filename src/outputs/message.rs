//! Rendering a [`ChangeSet`] into Telegram HTML messages.
//!
//! # Layout
//!
//! ```text
//! <b>🚨 Changes on example.com/author/yuri</b>
//! 2 new · 1 removed
//!
//! <b>🆕 New articles</b>
//! • <a href="https://example.com/b/">Title B</a>
//!
//! <b>🗑️ Removed articles</b>
//! • <a href="https://example.com/c/">Title C</a>
//! ```
//!
//! # Length budget
//!
//! Every message stays within `max_len` characters. Entries are atomic: when
//! the next one does not fit, the message is closed and a continuation is
//! started. Once `max_messages` are used, remaining entries are replaced by an
//! "… and N more" line. The only thing ever shortened is the text of a single
//! entry that could not fit even in an empty message, and that text is cut
//! before escaping so no tag or entity is left open.

use crate::config::NewArticleAttribution;
use crate::diff::ChangeSet;
use crate::models::{Attribution, AttributionStatus};
use crate::utils::{escape_html, truncate_chars};

/// Characters kept free in the last message for the overflow line.
const OVERFLOW_RESERVE: usize = 48;
/// Longest byline shown in an attribution entry, in characters.
const MAX_BYLINE_CHARS: usize = 80;
/// Messages shorter than this cannot hold a header plus one entry.
pub const MIN_MESSAGE_LEN: usize = 256;

/// Rendering options.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Human-readable name of the watched listing, shown in the header.
    pub source: String,
    pub max_len: usize,
    pub max_messages: usize,
    pub new_article_attribution: NewArticleAttribution,
}

/// One bullet: a link plus optional trailing markup.
struct Line {
    url: String,
    title: String,
    /// Already escaped, balanced markup appended after the link.
    suffix: String,
}

impl Line {
    fn render(&self, title_html: &str) -> String {
        format!(
            "• <a href=\"{}\">{}</a>{}",
            escape_html(&self.url),
            title_html,
            self.suffix
        )
    }

    /// Render within `budget` characters, shortening the title if needed.
    fn render_within(&self, budget: usize) -> String {
        let full = self.render(&escape_html(&self.title));
        if char_len(&full) <= budget {
            return full;
        }
        let overhead = char_len(&self.render(""));
        if overhead < budget {
            return self.render(&escape_truncated(&self.title, budget - overhead));
        }
        format!("• {}", escape_truncated(&self.url, budget.saturating_sub(2)))
    }
}

struct Section {
    heading: &'static str,
    lines: Vec<Line>,
}

/// Render `changes` into zero or more messages.
///
/// An empty change set renders to no messages.
pub fn render(changes: &ChangeSet, options: &ReportOptions) -> Vec<String> {
    if changes.is_empty() {
        return Vec::new();
    }

    let sections = sections(changes, options.new_article_attribution);
    let header = header(changes, options);
    let continued = format!("{}\n<i>(continued)</i>", title_line(options));
    let total: usize = sections.iter().map(|s| s.lines.len()).sum();
    let max_messages = options.max_messages.max(1);

    let mut messages: Vec<String> = Vec::new();
    let mut current = header;
    let mut open_heading: Option<&'static str> = None;
    let mut emitted = 0usize;

    for section in &sections {
        for line in &section.lines {
            let more_follow = emitted + 1 < total;
            let budget = |messages: &Vec<String>| {
                if messages.len() + 1 == max_messages && more_follow {
                    options.max_len.saturating_sub(OVERFLOW_RESERVE)
                } else {
                    options.max_len
                }
            };

            let prefix = entry_prefix(open_heading, section.heading);
            let room = budget(&messages).saturating_sub(char_len(&current) + char_len(&prefix));
            let rendered = line.render_within(budget(&messages));

            if char_len(&rendered) <= room {
                current.push_str(&prefix);
                current.push_str(&rendered);
            } else if open_heading.is_none() {
                // Nothing else in this message yet: shorten rather than skip.
                current.push_str(&prefix);
                current.push_str(&line.render_within(room));
            } else if messages.len() + 1 == max_messages {
                current.push_str(&overflow_line(total - emitted));
                messages.push(current);
                return messages;
            } else {
                messages.push(current);
                current = continued.clone();
                let prefix = entry_prefix(None, section.heading);
                let room =
                    budget(&messages).saturating_sub(char_len(&current) + char_len(&prefix));
                current.push_str(&prefix);
                current.push_str(&line.render_within(room));
            }
            open_heading = Some(section.heading);
            emitted += 1;
        }
    }

    messages.push(current);
    messages
}

fn sections(changes: &ChangeSet, policy: NewArticleAttribution) -> Vec<Section> {
    let added = changes
        .added
        .iter()
        .map(|entry| {
            let suffix = match (policy, entry.article.author.status()) {
                (NewArticleAttribution::Flag, Some(status)) if status != AttributionStatus::Ok => {
                    format!(" ⚠️ <i>{}</i>", describe(&entry.article.author))
                }
                _ => String::new(),
            };
            Line {
                url: entry.url.clone(),
                title: entry.article.title.clone(),
                suffix,
            }
        })
        .collect();

    let removed = changes
        .removed
        .iter()
        .map(|entry| Line {
            url: entry.url.clone(),
            title: entry.article.title.clone(),
            suffix: String::new(),
        })
        .collect();

    let attribution = changes
        .attribution_changed
        .iter()
        .map(|change| Line {
            url: change.url.clone(),
            title: change.title.clone(),
            suffix: format!(
                ": <i>{}</i> → <i>{}</i>",
                describe(&change.previous),
                describe(&change.current)
            ),
        })
        .collect();

    [
        Section {
            heading: "<b>🆕 New articles</b>",
            lines: added,
        },
        Section {
            heading: "<b>🗑️ Removed articles</b>",
            lines: removed,
        },
        Section {
            heading: "<b>✏️ Author changed</b>",
            lines: attribution,
        },
    ]
    .into_iter()
    .filter(|section| !section.lines.is_empty())
    .collect()
}

fn title_line(options: &ReportOptions) -> String {
    let source = truncate_chars(&options.source, options.max_len / 4);
    format!("<b>🚨 Changes on {}</b>", escape_html(&source))
}

fn header(changes: &ChangeSet, options: &ReportOptions) -> String {
    let mut counts = Vec::new();
    if !changes.added.is_empty() {
        counts.push(format!("{} new", changes.added.len()));
    }
    if !changes.removed.is_empty() {
        counts.push(format!("{} removed", changes.removed.len()));
    }
    if !changes.attribution_changed.is_empty() {
        counts.push(format!("{} author changes", changes.attribution_changed.len()));
    }
    format!("{}\n{}", title_line(options), counts.join(" · "))
}

fn entry_prefix(open_heading: Option<&str>, heading: &str) -> String {
    if open_heading == Some(heading) {
        "\n".to_string()
    } else {
        format!("\n\n{heading}\n")
    }
}

fn overflow_line(remaining: usize) -> String {
    format!("\n\n<i>… and {remaining} more</i>")
}

fn describe(attribution: &Attribution) -> String {
    escape_html(&truncate_chars(&attribution.to_string(), MAX_BYLINE_CHARS))
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Escape `s`, keeping the escaped result within `max` characters.
///
/// Cuts on source characters, so no entity is ever split; appends `…` when cut.
fn escape_truncated(s: &str, max: usize) -> String {
    let escaped = escape_html(s);
    if char_len(&escaped) <= max {
        return escaped;
    }
    let mut out = String::new();
    let mut used = 0usize;
    for c in s.chars() {
        let piece = escape_html(c.encode_utf8(&mut [0u8; 4]));
        let width = char_len(&piece);
        if used + width + 1 > max {
            break;
        }
        out.push_str(&piece);
        used += width;
    }
    if max > 0 {
        out.push('…');
    }
    out
}
