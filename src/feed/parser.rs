use quick_xml::events::Event;
use quick_xml::reader::Reader;
use thiserror::Error;

/// The RSS body could not be turned into a [`FeedDocument`].
#[derive(Debug, Error)]
#[error("Invalid RSS document: {0}")]
pub struct ParseError(String);

/// A decoded feed: channel metadata plus entries in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    pub entries: Vec<FeedEntry>,
}

/// One `<item>`.
///
/// `published` is the raw `pubDate` text, possibly empty. Turning it into an
/// instant is the ingestion step's job, see
/// [`normalize_published`](super::normalize_published).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub description: String,
    pub published: String,
}

// Element depths: 1 root, 2 channel, 3 channel fields and items, 4 item fields
const CHANNEL_DEPTH: usize = 2;
const ITEM_DEPTH: usize = 3;

/// Text-bearing element being collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    ChannelTitle,
    ChannelLink,
    ChannelDescription,
    ItemTitle,
    ItemLink,
    ItemDescription,
    ItemPubDate,
}

impl Field {
    /// Names are matched exactly, prefix included, so `atom:link` or
    /// `dc:title` never stand in for `link` or `title`.
    fn at(depth: usize, name: &[u8], in_channel: bool, in_item: bool) -> Option<Self> {
        if in_item && depth == ITEM_DEPTH + 1 {
            return match name {
                b"title" => Some(Self::ItemTitle),
                b"link" => Some(Self::ItemLink),
                b"description" => Some(Self::ItemDescription),
                b"pubDate" => Some(Self::ItemPubDate),
                _ => None,
            };
        }
        if in_channel && !in_item && depth == CHANNEL_DEPTH + 1 {
            return match name {
                b"title" => Some(Self::ChannelTitle),
                b"link" => Some(Self::ChannelLink),
                b"description" => Some(Self::ChannelDescription),
                _ => None,
            };
        }
        None
    }

    fn depth(self) -> usize {
        match self {
            Self::ChannelTitle | Self::ChannelLink | Self::ChannelDescription => CHANNEL_DEPTH + 1,
            _ => ITEM_DEPTH + 1,
        }
    }

    /// A repeated element overwrites the earlier value.
    fn store(self, value: String, document: &mut FeedDocument, entry: Option<&mut FeedEntry>) {
        match (self, entry) {
            (Self::ChannelTitle, _) => document.title = value,
            (Self::ChannelLink, _) => document.link = value,
            (Self::ChannelDescription, _) => document.description = value,
            (Self::ItemTitle, Some(entry)) => entry.title = value,
            (Self::ItemLink, Some(entry)) => entry.link = value,
            (Self::ItemDescription, Some(entry)) => entry.description = value,
            (Self::ItemPubDate, Some(entry)) => entry.published = value,
            (_, None) => {}
        }
    }
}

/// Decode an RSS 2.0 body.
///
/// Only `<channel>` directly under the root element is read, and only its
/// own `title`, `link`, `description` and `<item>` children. Anything else
/// (namespaced extensions, `<image>`, `<guid>`, stray elements between
/// items) is skipped. Titles and descriptions are HTML-unescaped once more
/// after XML decoding, since many feeds double-escape them (`&amp;amp;`,
/// `&amp;#39;`). A document without a `<channel>` is an error.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedDocument, ParseError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut document: Option<FeedDocument> = None;
    let mut in_channel = false;
    let mut entry: Option<FeedEntry> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let depth = path.len() + 1;
                let name = e.name();
                match (depth, name.as_ref()) {
                    (CHANNEL_DEPTH, b"channel") if document.is_none() => {
                        document = Some(FeedDocument::default());
                        in_channel = true;
                    }
                    (ITEM_DEPTH, b"item") if in_channel => entry = Some(FeedEntry::default()),
                    _ => {}
                }
                if field.is_none() {
                    field = Field::at(depth, name.as_ref(), in_channel, entry.is_some());
                    text.clear();
                }
                path.push(name.as_ref().to_vec());
            }
            Ok(Event::Empty(e)) => {
                let depth = path.len() + 1;
                let name = e.name();
                match (depth, name.as_ref()) {
                    (CHANNEL_DEPTH, b"channel") if document.is_none() => {
                        document = Some(FeedDocument::default());
                    }
                    (ITEM_DEPTH, b"item") if in_channel => {
                        if let Some(document) = document.as_mut() {
                            document.entries.push(FeedEntry::default());
                        }
                    }
                    _ => {
                        let empty = Field::at(depth, name.as_ref(), in_channel, entry.is_some());
                        if let (Some(empty), Some(document)) = (empty, document.as_mut()) {
                            empty.store(String::new(), document, entry.as_mut());
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if field.is_some() {
                    match e.unescape() {
                        Ok(decoded) => text.push_str(&decoded),
                        // Undeclared entity such as `&nbsp;`: keep the raw
                        // text and let the HTML pass resolve it
                        Err(_) => text.push_str(&String::from_utf8_lossy(&e)),
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::End(_)) => {
                let depth = path.len();
                path.pop();

                if let Some(open) = field.filter(|f| f.depth() == depth) {
                    if let Some(document) = document.as_mut() {
                        open.store(std::mem::take(&mut text), document, entry.as_mut());
                    }
                    field = None;
                }
                if in_channel && depth == ITEM_DEPTH {
                    if let (Some(done), Some(document)) = (entry.take(), document.as_mut()) {
                        document.entries.push(done);
                    }
                }
                if in_channel && depth == CHANNEL_DEPTH {
                    in_channel = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError(format!(
                    "{} at byte {}",
                    e,
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    if !path.is_empty() {
        return Err(ParseError("unexpected end of document".to_string()));
    }
    let mut document =
        document.ok_or_else(|| ParseError("missing <channel> element".to_string()))?;

    document.title = unescape_html(&document.title);
    document.link = document.link.trim().to_string();
    document.description = unescape_html(&document.description);
    for entry in &mut document.entries {
        entry.title = unescape_html(&entry.title);
        entry.link = entry.link.trim().to_string();
        entry.description = unescape_html(&entry.description);
    }

    Ok(document)
}

/// Resolve HTML character references. Text that fails to decode (a bare
/// `&` in prose, an unknown entity) is kept as-is.
fn unescape_html(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    htmlescape::decode_html(text).unwrap_or_else(|_| text.to_string())
}
