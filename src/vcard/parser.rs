//! A module to parse vCard files

use base64::Engine;
use chrono::NaiveDate;
use ical::property::Property;

use crate::contact::{Address, Birthday};
use crate::error::{Result, SyncError};
use crate::vcard::{split_components, unescape_text, unfold, ParsedCard, PropertyWarning};

/// What a single property decodes to. `Ok(None)` means "nothing to keep", `Err` means "malformed"
type PropertyResult<T> = std::result::Result<Option<T>, String>;


/// Parse a vCard file.
///
/// This only fails if the text is not a vCard at all. Properties that are malformed are skipped and reported in
/// [`ParsedCard::warnings`], so that the rest of the card remains usable.
pub fn decode(content: &str) -> Result<ParsedCard> {
    let mut warnings = Vec::new();
    let lines = check_envelope(content)?;

    let mut properties = Vec::new();
    for line in lines {
        match parse_content_line(&line) {
            Ok(prop) => properties.push(prop),
            Err(reason) => {
                log::debug!("Skipping malformed line {:?}: {}", line, reason);
                warnings.push(PropertyWarning { property: line_name(&line), reason });
            },
        }
    }

    // What to do with multiple items?
    if properties.iter().any(|prop| prop.name.eq_ignore_ascii_case("BEGIN") || prop.name.eq_ignore_ascii_case("END")) {
        return Err(SyncError::Parse("parsing multiple contacts in a single vCard is not supported".to_string()));
    }

    let mut card = ParsedCard::default();
    for prop in &properties {
        if let Err(reason) = apply_property(&mut card, prop) {
            log::debug!("Skipping malformed {} property: {}", prop.name, reason);
            warnings.push(PropertyWarning { property: property_name(prop), reason });
        }
    }
    card.warnings = warnings;
    Ok(card)
}

/// Unfold the content, make sure it is a single `BEGIN:VCARD`...`END:VCARD` block, and return the lines in between
fn check_envelope(content: &str) -> Result<Vec<String>> {
    let mut lines = unfold(content);

    match (lines.first(), lines.last()) {
        (Some(first), Some(last))
            if lines.len() >= 2
            && first.trim().eq_ignore_ascii_case("BEGIN:VCARD")
            && last.trim().eq_ignore_ascii_case("END:VCARD") => (),
        _ => return Err(SyncError::Parse("missing BEGIN:VCARD/END:VCARD envelope".to_string())),
    }

    lines.pop();
    lines.remove(0);
    Ok(lines)
}

/// Each content line is parsed on its own, so that a syntax error only loses this line
fn parse_content_line(line: &str) -> std::result::Result<Property, String> {
    if line.contains(':') == false {
        return Err("not a content line".to_string());
    }

    let mut parser = ical::PropertyParser::from_reader(line.as_bytes());
    match parser.next() {
        None => Err("empty line".to_string()),
        Some(Ok(prop)) => Ok(prop),
        Some(Err(err)) => {
            // Strip the "Line 1: " prefix
            let message = err.to_string();
            Err(match message.split_once(": ") {
                Some((_, reason)) => reason.to_string(),
                None => message,
            })
        },
    }
}

/// The property name of a line that could not be parsed, or the line itself if it has none
fn line_name(line: &str) -> String {
    let name = line.split(|c: char| c == ';' || c == ':').next().unwrap_or_default();
    if name.is_empty() {
        line.to_string()
    } else {
        strip_group(name).to_uppercase()
    }
}

/// `item1.EMAIL` is the `EMAIL` property of the group `item1`
fn strip_group(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

fn property_name(prop: &Property) -> String {
    strip_group(&prop.name).to_uppercase()
}

fn apply_property(card: &mut ParsedCard, prop: &Property) -> std::result::Result<(), String> {
    let name = property_name(prop);
    match name.as_str() {
        "UID" => set_first(&mut card.uid, raw_text(prop)),
        "FN" => set_first(&mut card.full_name, text(prop)),
        "N" => {
            if card.family_name.is_some() || card.given_name.is_some() {
                return Ok(());
            }
            if let Some((family, given)) = structured_name(prop)? {
                card.family_name = family;
                card.given_name = given;
            }
        },
        "EMAIL" => set_first(&mut card.email, text(prop)),
        "TEL" => set_first(&mut card.phone, text(prop)),
        "ORG" => set_first(&mut card.organization, organization(prop)),
        "TITLE" => set_first(&mut card.title, text(prop)),
        "URL" => set_first(&mut card.url, url(prop)),
        "NOTE" => set_first(&mut card.note, text(prop)),
        "BDAY" => set_first(&mut card.birthday, birthday(prop)?),
        "PHOTO" => set_first(&mut card.photo, photo(prop)?),
        "ADR" => set_first(&mut card.address, address(prop)?),
        _ => log::trace!("Ignoring property {}", name),
    }
    Ok(())
}

/// Only the first occurrence of a property is kept
fn set_first<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

fn raw_text(prop: &Property) -> Option<String> {
    prop.value.as_deref()
        .map(str::trim)
        .filter(|v| v.is_empty() == false)
        .map(str::to_string)
}

fn text(prop: &Property) -> Option<String> {
    raw_text(prop).map(|v| unescape_text(&v))
}

fn param_values<'a>(prop: &'a Property, key: &str) -> Vec<&'a str> {
    prop.params.iter()
        .flatten()
        .filter(|(k, _)| k.eq_ignore_ascii_case(key))
        .flat_map(|(_, values)| values.iter().map(String::as_str))
        .collect()
}

fn structured_name(prop: &Property) -> PropertyResult<(Option<String>, Option<String>)> {
    let value = match &prop.value {
        None => return Err("N has no value".to_string()),
        Some(v) => v,
    };
    let components = split_components(value);
    let component = |i: usize| components.get(i)
        .map(|c| c.trim().to_string())
        .filter(|c| c.is_empty() == false);

    Ok(Some((component(0), component(1))))
}

fn organization(prop: &Property) -> Option<String> {
    // Only the organization name is kept, not its units
    let value = prop.value.as_deref()?;
    split_components(value).into_iter()
        .next()
        .map(|org| org.trim().to_string())
        .filter(|org| org.is_empty() == false)
}

fn url(prop: &Property) -> Option<String> {
    text(prop).map(|u| u.trim_start_matches('<').trim_end_matches('>').to_string())
}

fn birthday(prop: &Property) -> PropertyResult<Birthday> {
    let value = match raw_text(prop) {
        None => return Ok(None),
        Some(v) => v,
    };

    if value.contains('-') == false {
        // Not an ISO date. Some servers do that, let's keep it as-is
        return Ok(Some(Birthday::Unparsed(value)));
    }

    // Date-times are reduced to their date
    let date_part = value.split('T').next().unwrap_or(&value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map(|date| Some(Birthday::Date(date)))
        .map_err(|err| format!("invalid date {:?}: {}", value, err))
}

fn photo(prop: &Property) -> PropertyResult<String> {
    let is_binary = param_values(prop, "ENCODING").iter()
        .any(|enc| enc.eq_ignore_ascii_case("b") || enc.eq_ignore_ascii_case("base64"));
    if is_binary == false {
        // e.g. a URI to a remote picture
        log::debug!("Ignoring a PHOTO that is not inline binary data");
        return Ok(None);
    }

    let value = match &prop.value {
        None => return Err("PHOTO has no value".to_string()),
        Some(v) => v,
    };
    let compact: String = value.chars().filter(|c| c.is_whitespace() == false).collect();
    let engine = &base64::engine::general_purpose::STANDARD;
    let bytes = engine.decode(&compact)
        .map_err(|err| format!("invalid base64 data: {}", err))?;
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(engine.encode(bytes)))
}

fn address(prop: &Property) -> PropertyResult<Address> {
    let value = match &prop.value {
        None => return Err("ADR has no value".to_string()),
        Some(v) => v,
    };
    let components = split_components(value);
    let component = |i: usize| components.get(i).map(|c| c.trim().to_string()).unwrap_or_default();

    // post office box;extended address;street;city;region;postal code;country
    let address = Address {
        street: component(2),
        city: component(3),
        postal_code: component(5),
        country: component(6),
    };
    if address.is_empty() {
        return Ok(None);
    }
    Ok(Some(address))
}
