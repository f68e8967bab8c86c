use std::{borrow::Cow, io};

use biblatex::{Bibliography, Chunk, ChunksExt, Entry, EntryType, Spanned};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use unicode_normalization::{UnicodeNormalization, is_nfc};

/// Parse a BibTeX document and clean every entry in place.
pub fn clean(text: &str) -> anyhow::Result<Bibliography> {
    let mut bib =
        Bibliography::parse(text).map_err(|e| anyhow::anyhow!("failed to parse BibTeX: {e}"))?;
    for entry in bib.iter_mut() {
        clean_entry(entry);
    }
    Ok(bib)
}

pub fn clean_entry(entry: &mut Entry) {
    page_double_hyphen(entry);
    convert_to_unicode(entry);

    // Redundant next to the DOI for papers.
    if matches!(entry.entry_type, EntryType::Article | EntryType::InProceedings) {
        entry.fields.remove("url");
    }
}

/// Serialize the bibliography as BibTeX into `out`, followed by a newline.
pub fn emit(bib: &Bibliography, out: &mut impl io::Write) -> anyhow::Result<()> {
    let mut text = String::new();
    bib.write_bibtex(&mut text)
        .map_err(|_| anyhow::anyhow!("failed to serialize BibTeX"))?;
    writeln!(out, "{text}")?;
    out.flush()?;
    Ok(())
}

fn page_double_hyphen(entry: &mut Entry) {
    let Some(pages) = entry.fields.get("pages") else {
        return;
    };
    let text = pages.format_verbatim();
    if let Some(range) = normalise_page_range(&text)
        && range != text
    {
        entry
            .fields
            .insert("pages".to_string(), vec![Spanned::detached(Chunk::Normal(range))]);
    }
}

/// Rewrite `12-34`, `12 – 34` and friends as `12--34`. Returns `None` when `pages` is not a range.
///
/// Only the outermost pieces are kept, so an open range stays open: `5-` becomes `5--`.
pub fn normalise_page_range(pages: &str) -> Option<String> {
    const DASHES: [char; 3] = ['-', '\u{2013}', '\u{2014}'];
    if !pages.contains(DASHES) {
        return None;
    }
    let mut parts = pages.split(DASHES).map(str::trim);
    let first = parts.next().unwrap_or_default();
    let last = parts.last().unwrap_or(first);
    Some(format!("{first}--{last}"))
}

fn convert_to_unicode(entry: &mut Entry) {
    for chunks in entry.fields.values_mut() {
        for chunk in chunks.iter_mut() {
            match &mut chunk.v {
                Chunk::Normal(s) | Chunk::Verbatim(s) => {
                    if let Cow::Owned(converted) = latex_to_unicode(s) {
                        *s = converted;
                    }
                }
                _ => {}
            }
        }
    }
}

fn accent_mark(accent: char) -> Option<char> {
    Some(match accent {
        '`' => '\u{300}',
        '\'' => '\u{301}',
        '^' => '\u{302}',
        '~' => '\u{303}',
        '=' => '\u{304}',
        'u' => '\u{306}',
        '.' => '\u{307}',
        '"' => '\u{308}',
        'r' => '\u{30A}',
        'H' => '\u{30B}',
        'v' => '\u{30C}',
        'c' => '\u{327}',
        'k' => '\u{328}',
        _ => return None,
    })
}

const ACCENT: &str = r#"\\(?P<acc>[`'^"~=.uvHckr])(?P<sp>\s*)(?:\{\s*(?P<braced>\\[ij]|[A-Za-z])\s*\}|(?P<bare>\\[ij]|[A-Za-z]))"#;

static WRAPPED_ACCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"\{{{ACCENT}\}}")).unwrap());
static ACCENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(ACCENT).unwrap());
static SYMBOL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\\(?P<w>ss|ae|AE|oe|OE|aa|AA|o|O|l|L)\}|\\(?P<b>ss|ae|AE|oe|OE|aa|AA|o|O|l|L)\b(?:\{\}|\s)?")
        .unwrap()
});
static ESCAPE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\([&%$#_])").unwrap());

fn replace_accent(caps: &Captures) -> String {
    let acc = caps["acc"].chars().next().unwrap_or_default();
    // `\cite`, `\url` and other control words share a first letter with the letter accents.
    if acc.is_ascii_alphabetic() && caps.name("bare").is_some() && caps["sp"].is_empty() {
        return caps[0].to_string();
    }
    let base = match caps.name("braced").or_else(|| caps.name("bare")).map(|m| m.as_str()) {
        Some(r"\i") => 'i',
        Some(r"\j") => 'j',
        Some(s) => s.chars().next().unwrap_or_default(),
        None => return caps[0].to_string(),
    };
    let Some(mark) = accent_mark(acc) else {
        return caps[0].to_string();
    };
    // Composed by the NFC pass in `latex_to_unicode`.
    format!("{base}{mark}")
}

fn symbol(name: &str) -> &'static str {
    match name {
        "ss" => "ß",
        "ae" => "æ",
        "AE" => "Æ",
        "oe" => "œ",
        "OE" => "Œ",
        "aa" => "å",
        "AA" => "Å",
        "o" => "ø",
        "O" => "Ø",
        "l" => "ł",
        "L" => "Ł",
        _ => "",
    }
}

/// Replace LaTeX accent and symbol escapes with their Unicode characters, composing letters
/// with their accents wherever a precomposed form exists (NFC).
pub fn latex_to_unicode(s: &str) -> Cow<'_, str> {
    if !s.contains('\\') && is_nfc(s) {
        return Cow::Borrowed(s);
    }

    let out = WRAPPED_ACCENT_RE.replace_all(s, replace_accent);
    let out = ACCENT_RE.replace_all(&out, replace_accent).into_owned();
    let out = SYMBOL_RE
        .replace_all(&out, |caps: &Captures| {
            let name = caps.name("w").or_else(|| caps.name("b")).map_or("", |m| m.as_str());
            symbol(name).to_string()
        })
        .into_owned();
    let out = ESCAPE_RE.replace_all(&out, "$1").into_owned();
    let out: String = out.nfc().collect();

    if out == s {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(out)
    }
}
