use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, warn};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use url::Url;

use crate::error::AppCastError;
use crate::item::{AppCast, AppCastItem, DEFAULT_OPERATING_SYSTEM};
use crate::serializer::{AppCastSerializer, strip_bom};
use crate::version::SemVerLike;

pub const SPARKLE_NAMESPACE: &str = "http://www.andymatuschak.org/xml-namespaces/sparkle";

const SIGNATURE_ATTRIBUTES: [&str; 3] = [
    "sparkle:signature",
    "sparkle:edSignature",
    "sparkle:dsaSignature",
];

/// RSS 2.0 app cast with the `sparkle:` namespace extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlAppCastSerializer;

impl XmlAppCastSerializer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Default)]
struct RawItem {
    title: Option<String>,
    description: Option<String>,
    pub_date: Option<String>,
    release_notes_link: Option<String>,
    version: Option<String>,
    short_version: Option<String>,
    url: Option<String>,
    length: Option<String>,
    mime_type: Option<String>,
    signature: Option<String>,
    os: Option<String>,
    channel: Option<String>,
    critical: bool,
}

impl RawItem {
    fn apply_enclosure(&mut self, element: &BytesStart<'_>) -> Result<(), AppCastError> {
        for attribute in element.attributes() {
            let attribute = attribute.map_err(|error| {
                AppCastError::malformed(format!("bad enclosure attribute: {error}"))
            })?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute
                .unescape_value()
                .map_err(|error| {
                    AppCastError::malformed(format!("bad enclosure attribute {key}: {error}"))
                })?
                .into_owned();

            match key.as_str() {
                "url" => self.url = Some(value),
                "length" => self.length = Some(value),
                "type" => self.mime_type = Some(value),
                "sparkle:version" => self.version = Some(value),
                "sparkle:shortVersionString" => self.short_version = Some(value),
                "sparkle:os" => self.os = Some(value),
                "sparkle:channel" => self.channel = Some(value),
                "sparkle:criticalUpdate" => self.critical = parse_flag(&value),
                key if SIGNATURE_ATTRIBUTES.contains(&key) => {
                    if self.signature.as_deref().is_none_or(str::is_empty) {
                        self.signature = Some(value);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn apply_text(&mut self, element: &str, text: String) {
        match element {
            "title" => self.title = Some(text),
            "description" => self.description = Some(text),
            "pubDate" => self.pub_date = Some(text),
            "sparkle:releaseNotesLink" => self.release_notes_link = Some(text),
            "sparkle:version" => {
                self.version.get_or_insert(text);
            }
            "sparkle:shortVersionString" => {
                self.short_version.get_or_insert(text);
            }
            "sparkle:os" => {
                self.os.get_or_insert(text);
            }
            "sparkle:channel" => self.channel = Some(text),
            "sparkle:criticalUpdate" => self.critical = text.is_empty() || parse_flag(&text),
            _ => {}
        }
    }

    fn into_item(self) -> Result<AppCastItem, String> {
        let raw_version = self
            .version
            .ok_or_else(|| "item has no sparkle:version".to_string())?;
        let version: SemVerLike = raw_version
            .parse()
            .map_err(|error| format!("item version {raw_version:?} is unusable: {error}"))?;
        let url = self
            .url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| format!("item {version} has no enclosure url"))?;

        let update_size = match self.length.as_deref().map(str::trim) {
            None | Some("") => 0,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                debug!("Ignoring non-numeric enclosure length {raw:?} for {version}");
                0
            }),
        };
        let publication_date = self.pub_date.as_deref().and_then(|raw| {
            let parsed = parse_pub_date(raw);
            if parsed.is_none() {
                debug!("Ignoring unparsable pubDate {raw:?} for {version}");
            }
            parsed
        });

        Ok(AppCastItem {
            version,
            short_version: self.short_version,
            title: self.title,
            download_link: url.trim().to_string(),
            download_signature: self.signature.unwrap_or_default().trim().to_string(),
            publication_date,
            operating_system: self
                .os
                .filter(|os| !os.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_OPERATING_SYSTEM.to_string()),
            channel: self.channel.filter(|channel| !channel.trim().is_empty()),
            is_critical_update: self.critical,
            update_size,
            mime_type: self.mime_type,
            release_notes_link: self.release_notes_link,
            description: self.description,
        })
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

/// Parse an RSS `pubDate`. Accepts RFC 2822 (`+0000`/`GMT`), the
/// `+00:00` offset spelling some generators emit, RFC 3339, and a bare
/// timestamp assumed to be UTC.
#[must_use]
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%a, %d %b %Y %H:%M:%S %:z"))
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|parsed| parsed.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%a, %d %b %Y %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn element_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.name().as_ref()).into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Outside,
    Rss,
    Channel,
    Item,
}

impl AppCastSerializer for XmlAppCastSerializer {
    fn deserialize_with_base(
        &self,
        text: &str,
        base: Option<&Url>,
    ) -> Result<AppCast, AppCastError> {
        let mut reader = Reader::from_str(strip_bom(text));
        reader.config_mut().trim_text(true);

        let mut cast = AppCast::default();
        let mut stack: Vec<String> = Vec::new();
        let mut scope = Scope::Outside;
        let mut saw_rss = false;
        let mut saw_channel = false;
        let mut current: Option<RawItem> = None;
        let mut text_buf = String::new();
        let mut skipped = 0_usize;

        loop {
            let event = reader.read_event().map_err(|error| {
                AppCastError::malformed(format!(
                    "XML error at byte {}: {error}",
                    reader.buffer_position()
                ))
            })?;

            match event {
                Event::Start(element) => {
                    let name = element_name(&element);
                    scope = enter(scope, &name, &mut saw_rss, &mut saw_channel)?;
                    if scope == Scope::Item && name == "item" {
                        current = Some(RawItem::default());
                    } else if name == "enclosure"
                        && let Some(item) = current.as_mut()
                    {
                        item.apply_enclosure(&element)?;
                    }
                    stack.push(name);
                    text_buf.clear();
                }
                Event::Empty(element) => {
                    let name = element_name(&element);
                    if stack.is_empty() {
                        if name != "rss" {
                            return Err(root_error(&name));
                        }
                        saw_rss = true;
                        continue;
                    }
                    if let Some(item) = current.as_mut() {
                        if name == "enclosure" {
                            item.apply_enclosure(&element)?;
                        } else {
                            item.apply_text(&name, String::new());
                        }
                    }
                }
                Event::Text(content) => {
                    let unescaped = content.unescape().map_err(|error| {
                        AppCastError::malformed(format!("bad text content: {error}"))
                    })?;
                    text_buf.push_str(&unescaped);
                }
                Event::CData(content) => {
                    text_buf.push_str(&String::from_utf8_lossy(&content.into_inner()));
                }
                Event::End(_) => {
                    let Some(name) = stack.pop() else {
                        return Err(AppCastError::malformed("unbalanced closing tag"));
                    };
                    let text = std::mem::take(&mut text_buf);
                    match scope {
                        Scope::Item if name == "item" => {
                            if let Some(raw) = current.take() {
                                match raw.into_item() {
                                    Ok(item) => cast.items.push(item),
                                    Err(reason) => {
                                        skipped += 1;
                                        warn!("Skipping app cast item: {reason}");
                                    }
                                }
                            }
                            scope = Scope::Channel;
                        }
                        Scope::Item if stack.last().map(String::as_str) == Some("item") => {
                            if let Some(item) = current.as_mut() {
                                item.apply_text(&name, text);
                            }
                        }
                        Scope::Channel if name == "channel" => scope = Scope::Rss,
                        Scope::Channel if stack.last().map(String::as_str) == Some("channel") => {
                            apply_channel_text(&mut cast, &name, text);
                        }
                        Scope::Rss if name == "rss" => scope = Scope::Outside,
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !saw_rss {
            return Err(AppCastError::malformed("missing <rss> root element"));
        }
        if !saw_channel {
            return Err(AppCastError::malformed("missing <channel> element"));
        }
        if skipped > 0 {
            debug!("Skipped {skipped} unusable app cast item(s)");
        }

        if let Some(base) = base {
            cast.resolve_links(base);
        }
        cast.sort_items();
        Ok(cast)
    }

    fn serialize(&self, cast: &AppCast) -> Result<String, AppCastError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let mut rss = BytesStart::new("rss");
        rss.push_attribute(("xmlns:sparkle", SPARKLE_NAMESPACE));
        rss.push_attribute(("version", "2.0"));
        write(&mut writer, Event::Start(rss))?;
        write(&mut writer, Event::Start(BytesStart::new("channel")))?;

        write_optional(&mut writer, "title", cast.title.as_deref())?;
        write_optional(&mut writer, "link", cast.link.as_deref())?;
        write_optional(&mut writer, "description", cast.description.as_deref())?;
        write_optional(&mut writer, "language", cast.language.as_deref())?;

        for item in &cast.items {
            write_item(&mut writer, item)?;
        }

        write(&mut writer, Event::End(BytesEnd::new("channel")))?;
        write(&mut writer, Event::End(BytesEnd::new("rss")))?;

        String::from_utf8(writer.into_inner()).map_err(AppCastError::serialize_from)
    }
}

fn enter(
    scope: Scope,
    name: &str,
    saw_rss: &mut bool,
    saw_channel: &mut bool,
) -> Result<Scope, AppCastError> {
    Ok(match (scope, name) {
        (Scope::Outside, "rss") => {
            *saw_rss = true;
            Scope::Rss
        }
        (Scope::Outside, other) => return Err(root_error(other)),
        (Scope::Rss, "channel") => {
            *saw_channel = true;
            Scope::Channel
        }
        (Scope::Channel, "item") => Scope::Item,
        (current, _) => current,
    })
}

fn root_error(found: &str) -> AppCastError {
    AppCastError::malformed(format!("expected <rss> root element, found <{found}>"))
}

fn apply_channel_text(cast: &mut AppCast, element: &str, text: String) {
    match element {
        "title" => cast.title = Some(text),
        "link" => cast.link = Some(text),
        "description" => cast.description = Some(text),
        "language" => cast.language = Some(text),
        _ => {}
    }
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), AppCastError> {
    writer
        .write_event(event)
        .map_err(AppCastError::serialize_from)
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    text: &str,
) -> Result<(), AppCastError> {
    write(writer, Event::Start(BytesStart::new(name)))?;
    write(writer, Event::Text(BytesText::new(text)))?;
    write(writer, Event::End(BytesEnd::new(name)))
}

fn write_optional(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    text: Option<&str>,
) -> Result<(), AppCastError> {
    match text {
        Some(text) => write_text_element(writer, name, text),
        None => Ok(()),
    }
}

fn write_item(writer: &mut Writer<Vec<u8>>, item: &AppCastItem) -> Result<(), AppCastError> {
    write(writer, Event::Start(BytesStart::new("item")))?;

    write_optional(writer, "title", item.title.as_deref())?;
    write_optional(writer, "description", item.description.as_deref())?;
    write_optional(
        writer,
        "sparkle:releaseNotesLink",
        item.release_notes_link.as_deref(),
    )?;
    if let Some(date) = item.publication_date {
        write_text_element(writer, "pubDate", &date.to_rfc2822())?;
    }
    write_optional(writer, "sparkle:channel", item.channel.as_deref())?;

    let version = item.version.to_string();
    let length = item.update_size.to_string();
    let mut enclosure = BytesStart::new("enclosure");
    enclosure.push_attribute(("url", item.download_link.as_str()));
    enclosure.push_attribute(("sparkle:version", version.as_str()));
    if let Some(short) = item.short_version.as_deref() {
        enclosure.push_attribute(("sparkle:shortVersionString", short));
    }
    enclosure.push_attribute(("sparkle:os", item.operating_system.as_str()));
    enclosure.push_attribute(("length", length.as_str()));
    if let Some(mime_type) = item.mime_type.as_deref() {
        enclosure.push_attribute(("type", mime_type));
    }
    if item.has_signature() {
        enclosure.push_attribute(("sparkle:signature", item.download_signature.as_str()));
    }
    if item.is_critical_update {
        enclosure.push_attribute(("sparkle:criticalUpdate", "true"));
    }
    write(writer, Event::Empty(enclosure))?;

    write(writer, Event::End(BytesEnd::new("item")))
}
