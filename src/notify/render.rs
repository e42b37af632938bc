use std::fmt::Write as _;

use chrono::NaiveDate;
use html_escape::{encode_double_quoted_attribute, encode_text};

use super::DigestSection;
use crate::ingest::types::Item;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDigest {
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub fn display_date(date: NaiveDate) -> String {
    date.format("%B %d, %Y").to_string()
}

pub fn subject_for(date: NaiveDate) -> String {
    format!("🤖 AI Daily Digest - {}", display_date(date))
}

fn rule(ch: char, n: usize) -> String {
    std::iter::repeat(ch).take(n).collect()
}

fn byline(it: &Item) -> String {
    match it.authors.first() {
        Some(a) if it.authors.len() > 1 => format!("{} · {a} et al.", it.source),
        Some(a) => format!("{} · {a}", it.source),
        None => it.source.clone(),
    }
}

fn render_text(sections: &[&DigestSection], date: &str, total: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "🤖 AI Daily Digest - {date}");
    let _ = writeln!(out, "{total} items");
    let _ = writeln!(out, "{}", rule('=', 50));
    out.push('\n');

    for s in sections {
        let _ = writeln!(out, "{} {}", s.family.emoji(), s.family.heading().to_uppercase());
        let _ = writeln!(out, "{}", rule('-', 30));
        for it in &s.items {
            let _ = writeln!(out, "• {} ({})", it.title, byline(it));
            if !it.summary.is_empty() {
                let _ = writeln!(out, "  {}", it.summary);
            }
            let _ = writeln!(out, "  {}", it.url);
            out.push('\n');
        }
    }

    let _ = writeln!(out, "{}", rule('=', 50));
    out.push_str("Powered by ai-news-digest\n");
    out
}

fn render_html(sections: &[&DigestSection], date: &str, total: usize) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"></head>\n");
    out.push_str(
        "<body style=\"font-family: Arial, sans-serif; max-width: 640px; margin: 0 auto; color: #222;\">\n",
    );
    let _ = writeln!(out, "<h1>🤖 AI Daily Digest</h1>");
    let _ = writeln!(out, "<p>{} · {total} items</p>", encode_text(date));

    for s in sections {
        let _ = writeln!(
            out,
            "<h2>{} {}</h2>\n<ul style=\"padding-left: 18px;\">",
            s.family.emoji(),
            encode_text(s.family.heading())
        );
        for it in &s.items {
            out.push_str("<li style=\"margin-bottom: 14px;\">");
            if let Some(t) = &it.thumbnail {
                let _ = write!(
                    out,
                    "<img src=\"{}\" alt=\"\" width=\"120\" style=\"display:block; margin-bottom:6px;\">",
                    encode_double_quoted_attribute(t)
                );
            }
            let _ = write!(
                out,
                "<a href=\"{}\"><strong>{}</strong></a><br><small>{}</small>",
                encode_double_quoted_attribute(&it.url),
                encode_text(&it.title),
                encode_text(&byline(it))
            );
            if !it.summary.is_empty() {
                let _ = write!(out, "<br>{}", encode_text(&it.summary));
            }
            out.push_str("</li>\n");
        }
        out.push_str("</ul>\n");
    }

    out.push_str("<hr><p style=\"font-size: 12px; color: #888;\">Powered by ai-news-digest</p>\n");
    out.push_str("</body></html>\n");
    out
}

/// Subject, plain text and HTML bodies. Empty sections are left out.
pub fn render_digest(sections: &[DigestSection], date: NaiveDate) -> RenderedDigest {
    let shown: Vec<&DigestSection> = sections.iter().filter(|s| !s.items.is_empty()).collect();
    let total = shown.iter().map(|s| s.items.len()).sum();
    let date_s = display_date(date);
    RenderedDigest {
        subject: subject_for(date),
        text: render_text(&shown, &date_s, total),
        html: render_html(&shown, &date_s, total),
    }
}

pub fn render_test() -> RenderedDigest {
    let text = "This is a test email from ai-news-digest.\n\nSetup successful! 🎉\n".to_string();
    RenderedDigest {
        subject: "✅ AI News Digest - Test Email".to_string(),
        html: format!("<p>{}</p>", encode_text(&text).replace('\n', "<br>")),
        text,
    }
}
