use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;

use super::fetcher::FetchError;

/// Channel-level data of an RSS 2.0 document plus its items, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<ParsedItem>,
}

/// One `<item>`. `pub_date` is kept raw; normalization happens at ingest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

/// Decode an RSS 2.0 document.
///
/// Only direct children of `<channel>` and `<item>` are read, so nested
/// elements such as `<image><title>` or `<atom:link>` never overwrite the
/// fields. Markup inside a field contributes its text, so
/// `<description>a <b>b</b> c</description>` reads as `a b c`. Free-text fields are HTML-unescaped after XML decoding, which
/// resolves double-encoded entities (`&amp;amp;` -> `&`).
///
/// # Errors
///
/// [`FetchError::Parse`] for malformed XML, a truncated document, or a
/// document without a `<channel>` element.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, FetchError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut text = String::new();
    let mut channel: Option<ParsedFeed> = None;
    let mut item: Option<ParsedItem> = None;
    let mut channel_closed = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.name().as_ref().to_vec();
                let parent = path.last().map(Vec::as_slice);
                match (parent, name.as_slice()) {
                    (_, b"channel") if channel.is_none() && path.len() <= 1 => {
                        channel = Some(ParsedFeed::default());
                    }
                    (Some(b"channel"), b"item") if channel.is_some() && !channel_closed => {
                        item = Some(ParsedItem::default());
                    }
                    _ => {}
                }
                if is_field_parent(parent) {
                    text.clear();
                }
                path.push(name);
            }
            Ok(Event::Text(e)) => {
                // Entities XML does not know (e.g. &nbsp;) are left for the HTML pass
                let decoded = e
                    .unescape()
                    .unwrap_or_else(|_| Cow::Owned(String::from_utf8_lossy(&e).into_owned()));
                text.push_str(&decoded);
            }
            Ok(Event::CData(e)) => {
                text.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::End(_)) => {
                let name = path.pop().unwrap_or_default();
                let parent = path.last().map(Vec::as_slice);
                match (parent, name.as_slice()) {
                    (Some(b"item"), field) => {
                        let value = std::mem::take(&mut text);
                        if let Some(current) = item.as_mut() {
                            assign_item_field(current, field, value.trim());
                        }
                    }
                    (Some(b"channel"), b"item") => {
                        if let (Some(feed), Some(done)) = (channel.as_mut(), item.take()) {
                            feed.items.push(done);
                        }
                    }
                    (Some(b"channel"), field) if !channel_closed => {
                        let value = std::mem::take(&mut text);
                        if let Some(feed) = channel.as_mut() {
                            assign_channel_field(feed, field, value.trim());
                        }
                    }
                    (_, b"channel") => channel_closed = true,
                    // Nested markup: its text stays with the enclosing field
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FetchError::Parse(format!(
                    "XML error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    if !path.is_empty() {
        return Err(FetchError::Parse(format!(
            "Document ended inside <{}>",
            String::from_utf8_lossy(path.last().map(Vec::as_slice).unwrap_or_default())
        )));
    }

    let mut feed = channel.ok_or_else(|| FetchError::Parse("Missing <channel> element".into()))?;

    feed.title = unescape_html(&feed.title);
    feed.description = unescape_html(&feed.description);
    for item in &mut feed.items {
        item.title = unescape_html(&item.title);
        item.description = unescape_html(&item.description);
    }

    Ok(feed)
}

/// Text is collected per field; markup below a field only adds to it.
fn is_field_parent(parent: Option<&[u8]>) -> bool {
    matches!(parent, Some(b"channel" | b"item"))
}

fn assign_channel_field(feed: &mut ParsedFeed, field: &[u8], value: &str) {
    let slot = match field {
        b"title" => &mut feed.title,
        b"link" => &mut feed.link,
        b"description" => &mut feed.description,
        _ => return,
    };
    *slot = value.to_string();
}

fn assign_item_field(item: &mut ParsedItem, field: &[u8], value: &str) {
    let slot = match field {
        b"title" => &mut item.title,
        b"link" => &mut item.link,
        b"description" => &mut item.description,
        b"pubDate" => &mut item.pub_date,
        _ => return,
    };
    *slot = value.to_string();
}

fn unescape_html(s: &str) -> String {
    html_escape::decode_html_entities(s).trim().to_string()
}
