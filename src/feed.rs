//! RSS rendering of stored summaries, one digest item per calendar day.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use log::debug;
use quick_xml::escape::escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::collections::BTreeMap;
use std::io::Cursor;

use crate::database::SummaryRecord;

pub const FEED_TITLE: &str = "Important Emails Digest";
pub const FEED_DESCRIPTION: &str = "Daily digests of important emails as determined by AI";
/// Days with at least one record that make it into the feed
pub const FEED_DAYS: usize = 30;

/// One message line of a daily digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestEntry {
    pub subject: String,
    pub from_name: String,
    pub summary: String,
    /// e.g. "9:30 AM"
    pub time: String,
}

/// Sender's wall-clock time of a record.
///
/// The header text is tried as RFC 2822 first, then in the two layouts older
/// rows were written with; `date_ts` is the last resort.
pub fn record_datetime(record: &SummaryRecord) -> Option<NaiveDateTime> {
    let date = record.date.trim();

    if let Ok(dt) = DateTime::parse_from_rfc2822(date) {
        return Some(dt.naive_local());
    }

    let legacy = [("%a, %d %b %Y %H:%M:%S", 25), ("%Y-%m-%d %H:%M:%S", 19)];
    for (format, width) in legacy {
        let prefix: String = date.chars().take(width).collect();
        if let Ok(dt) = NaiveDateTime::parse_from_str(prefix.trim(), format) {
            return Some(dt);
        }
    }

    record
        .date_ts
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.naive_utc())
}

/// Summary text to show: `ai_summary` when set, otherwise the legacy
/// `summary` column reduced to its answer.
pub fn display_summary(record: &SummaryRecord) -> String {
    match record.ai_summary.as_deref().filter(|s| !s.is_empty()) {
        Some(summary) => summary.to_string(),
        None => parse_summary_text(&record.summary),
    }
}

/// Older rows hold a "Subject: / From: / Summary:" block. Returns the text
/// after `Summary:`; without one, short text is returned whole and long
/// text is reduced to its last non-empty line.
pub fn parse_summary_text(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    for line in raw.trim().lines() {
        if let Some(rest) = line.trim().strip_prefix("Summary:") {
            return rest.trim().to_string();
        }
    }

    let last = raw.lines().map(str::trim).filter(|l| !l.is_empty()).last();
    match last {
        Some(_) if raw.chars().count() < 200 => raw.to_string(),
        Some(line) => line.to_string(),
        None => raw.to_string(),
    }
}

/// Groups records by calendar day, newest day first, keeping at most
/// `max_days` days. Records whose date cannot be read are left out.
pub fn group_by_day(records: &[SummaryRecord], max_days: usize) -> Vec<(NaiveDate, Vec<DigestEntry>)> {
    let mut days: BTreeMap<NaiveDate, Vec<DigestEntry>> = BTreeMap::new();

    for record in records {
        let Some(when) = record_datetime(record) else {
            debug!("UID {}: unreadable date '{}', left out of feed", record.uid, record.date);
            continue;
        };

        let from_name = if record.from_name.is_empty() {
            "Unknown".to_string()
        } else {
            record.from_name.clone()
        };

        days.entry(when.date()).or_default().push(DigestEntry {
            subject: record.subject.clone(),
            from_name,
            summary: display_summary(record),
            time: when.format("%I:%M %p").to_string().trim_start_matches('0').to_string(),
        });
    }

    days.into_iter().rev().take(max_days).collect()
}

/// HTML body of one day's digest item.
pub fn render_digest(entries: &[DigestEntry]) -> String {
    let mut digest = String::new();

    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            digest.push_str(r#"<hr style="margin: 20px 0; border: 1px solid #ccc;">"#);
        }
        digest.push_str(r#"<div style="margin-bottom: 20px;">"#);
        digest.push_str(&format!(
            r#"<h3 style="margin: 0 0 5px 0; color: #333;">{} <span style="font-size: 0.8em; color: #666;">({})</span></h3>"#,
            escape(entry.subject.as_str()),
            entry.time
        ));
        digest.push_str(&format!(
            r#"<p style="margin: 5px 0; color: #666; font-style: italic;">From: {}</p>"#,
            escape(entry.from_name.as_str())
        ));
        digest.push_str(&format!(
            r#"<p style="margin: 10px 0; line-height: 1.4;">{}</p>"#,
            escape(entry.summary.as_str())
        ));
        digest.push_str("</div>");
    }

    digest
}

/// Renders the RSS 2.0 document for `records` (as returned by the store).
pub fn render_rss(records: &[SummaryRecord], now: DateTime<Utc>, public_url: &str) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    rss.push_attribute(("xmlns:atom", "http://www.w3.org/2005/Atom"));
    writer.write_event(Event::Start(rss))?;
    writer.write_event(Event::Start(BytesStart::new("channel")))?;

    write_text_element(&mut writer, "title", FEED_TITLE)?;
    write_text_element(&mut writer, "link", public_url)?;
    write_text_element(&mut writer, "description", FEED_DESCRIPTION)?;

    let mut self_link = BytesStart::new("atom:link");
    self_link.push_attribute(("href", public_url));
    self_link.push_attribute(("rel", "self"));
    self_link.push_attribute(("type", "application/rss+xml"));
    writer.write_event(Event::Empty(self_link))?;

    write_text_element(&mut writer, "language", "en")?;
    write_text_element(&mut writer, "lastBuildDate", &now.to_rfc2822())?;

    for (day, entries) in group_by_day(records, FEED_DAYS) {
        let midnight = Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN));

        writer.write_event(Event::Start(BytesStart::new("item")))?;
        write_text_element(
            &mut writer,
            "title",
            &format!("Important Emails - {}", day.format("%B %d, %Y")),
        )?;

        let mut guid = BytesStart::new("guid");
        guid.push_attribute(("isPermaLink", "false"));
        writer.write_event(Event::Start(guid))?;
        writer.write_event(Event::Text(BytesText::new(&format!("digest-{}", day))))?;
        writer.write_event(Event::End(BytesEnd::new("guid")))?;

        write_text_element(&mut writer, "description", &render_digest(&entries))?;
        write_text_element(&mut writer, "pubDate", &midnight.to_rfc2822())?;
        writer.write_event(Event::End(BytesEnd::new("item")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("channel")))?;
    writer.write_event(Event::End(BytesEnd::new("rss")))?;

    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

fn write_text_element<W: std::io::Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(uid: u32, date: &str, summary: &str, ai_summary: Option<&str>) -> SummaryRecord {
        SummaryRecord {
            uid,
            subject: format!("Subject {}", uid),
            from_name: "Alice".to_string(),
            date: date.to_string(),
            summary: summary.to_string(),
            ai_summary: ai_summary.map(str::to_string),
            date_ts: None,
        }
    }

    #[test]
    fn test_record_datetime_formats() {
        let rfc = record(1, "Mon, 6 Oct 2025 09:05:00 +0200", "", None);
        assert_eq!(
            record_datetime(&rfc).map(|d| d.to_string()),
            Some("2025-10-06 09:05:00".to_string())
        );

        let legacy = record(2, "2024-01-02 10:00:00.123456", "", None);
        assert_eq!(
            record_datetime(&legacy).map(|d| d.to_string()),
            Some("2024-01-02 10:00:00".to_string())
        );

        let mut fallback = record(3, "sometime last week", "", None);
        assert_eq!(record_datetime(&fallback), None);
        fallback.date_ts = Some(86_400);
        assert_eq!(
            record_datetime(&fallback).map(|d| d.to_string()),
            Some("1970-01-02 00:00:00".to_string())
        );
    }

    #[test]
    fn test_parse_summary_text() {
        assert_eq!(
            parse_summary_text("Subject: Rent\nFrom: Landlord\nSummary: Pay by Friday."),
            "Pay by Friday."
        );
        assert_eq!(parse_summary_text("Short note"), "Short note");

        let long = format!("{}\n\nFinal line here.", "word ".repeat(50));
        assert_eq!(parse_summary_text(&long), "Final line here.");
        assert_eq!(parse_summary_text(""), "");
    }

    #[test]
    fn test_group_by_day() {
        let records = vec![
            record(3, "Tue, 14 Oct 2025 18:45:00 +0000", "", Some("Evening")),
            record(2, "Tue, 14 Oct 2025 09:30:00 +0000", "", Some("Morning")),
            record(1, "Mon, 13 Oct 2025 10:00:00 +0000", "Summary: Legacy", None),
            record(4, "garbage", "", Some("lost")),
        ];

        let days = group_by_day(&records, FEED_DAYS);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].0, NaiveDate::from_ymd_opt(2025, 10, 14).unwrap());
        assert_eq!(days[0].1.len(), 2);
        assert_eq!(days[0].1[0].time, "6:45 PM");
        assert_eq!(days[0].1[1].time, "9:30 AM");
        assert_eq!(days[1].1[0].summary, "Legacy");
    }

    #[test]
    fn test_group_by_day_keeps_most_recent_days() {
        let records: Vec<SummaryRecord> = (1..=40)
            .map(|day| {
                let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + chrono::Days::new(day);
                record(day as u32, &format!("{} 12:00:00", date), "", Some("x"))
            })
            .collect();

        let days = group_by_day(&records, FEED_DAYS);
        assert_eq!(days.len(), 30);
        assert_eq!(days[0].0, NaiveDate::from_ymd_opt(2025, 2, 10).unwrap());
    }

    #[test]
    fn test_render_digest_escapes() {
        let html = render_digest(&[
            DigestEntry {
                subject: "A & B".to_string(),
                from_name: "Bob <bob@example.com>".to_string(),
                summary: "Reply".to_string(),
                time: "9:30 AM".to_string(),
            },
            DigestEntry {
                subject: "Second".to_string(),
                from_name: "Carol".to_string(),
                summary: "Call back".to_string(),
                time: "10:00 AM".to_string(),
            },
        ]);

        assert!(html.contains("A &amp; B <span"));
        assert!(html.contains("From: Bob &lt;bob@example.com&gt;"));
        assert_eq!(html.matches("<hr ").count(), 1);
    }

    #[test]
    fn test_render_rss() {
        let records = vec![record(1, "Tue, 14 Oct 2025 09:30:00 +0000", "", Some("Pay the plumber"))];
        let now = Utc.with_ymd_and_hms(2025, 10, 15, 6, 0, 0).unwrap();

        let xml = render_rss(&records, now, "http://localhost:5000/rss").unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<title>Important Emails Digest</title>"));
        assert!(xml.contains("<title>Important Emails - October 14, 2025</title>"));
        assert!(xml.contains("digest-2025-10-14"));
        assert!(xml.contains("Pay the plumber"));
        assert!(xml.contains("<pubDate>Tue, 14 Oct 2025 00:00:00 +0000</pubDate>"));
        assert_eq!(xml.matches("<item>").count(), 1);
    }

    #[test]
    fn test_render_empty_feed() {
        let xml = render_rss(&[], Utc::now(), "http://example.com/rss").unwrap();
        assert!(xml.contains("<channel>"));
        assert!(!xml.contains("<item>"));
    }
}
