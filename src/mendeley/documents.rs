use std::time::Duration;

use indicatif::ProgressBar;
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use ureq::http::{HeaderMap, Response};
use url::Url;

use crate::mendeley::{Error, Session, USER_AGENT, api_message};

/// Largest page size the documents endpoint accepts.
pub const PAGE_SIZE: u32 = 500;
pub const FIRST_PAGE_TIMEOUT: Duration = Duration::from_secs(10);
const BIBTEX: &str = "application/x-bibtex";
/// A page of 500 BibTeX records with abstracts stays well below this.
const MAX_PAGE_BYTES: u64 = 64 * 1024 * 1024;

/// Download every page of the user's library in BibTeX form.
///
/// Pages are concatenated byte for byte in the order the `next` links lead through them. Only
/// the first request carries a timeout.
pub fn fetch_all(
    agent: &ureq::Agent,
    api_url: &Url,
    session: &Session,
    progress: &ProgressBar,
) -> Result<Vec<u8>, Error> {
    let mut url = api_url.join("documents")?;
    url.query_pairs_mut()
        .append_pair("view", "bib")
        .append_pair("limit", &PAGE_SIZE.to_string());

    progress.set_message("fetching page 1");
    debug!("GET {url}");
    let mut res = agent
        .get(url.as_str())
        .header("Authorization", session.authorization())
        .header("Accept", BIBTEX)
        .header("User-Agent", USER_AGENT)
        .config()
        .timeout_global(Some(FIRST_PAGE_TIMEOUT))
        .build()
        .call()?;

    if res.status() != 200 {
        return Err(Error::FirstPage {
            status: res.status().as_u16(),
            message: error_message(&mut res),
        });
    }

    let mut content = read_page(&mut res)?;
    let mut next = next_link(res.headers(), &url);
    let mut pages = 1;

    while let Some(page_url) = next {
        pages += 1;
        progress.set_message(format!("fetching page {pages}"));
        debug!("GET {page_url}");
        let mut res = agent
            .get(page_url.as_str())
            .header("Authorization", session.authorization())
            .header("Accept", BIBTEX)
            .header("User-Agent", USER_AGENT)
            .call()?;

        if res.status() != 200 {
            return Err(Error::LaterPage {
                url: page_url.to_string(),
                status: res.status().as_u16(),
                message: error_message(&mut res),
            });
        }

        content.extend(read_page(&mut res)?);
        next = next_link(res.headers(), &page_url);
    }

    info!("downloaded {pages} page(s), {} bytes", content.len());
    Ok(content)
}

fn read_page(res: &mut Response<ureq::Body>) -> Result<Vec<u8>, Error> {
    Ok(res
        .body_mut()
        .with_config()
        .limit(MAX_PAGE_BYTES)
        .read_to_vec()?)
}

fn error_message(res: &mut Response<ureq::Body>) -> Option<String> {
    let body = res.body_mut().read_to_vec().ok()?;
    api_message(&body)
}

/// A single target of a `Link` header together with its relation types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub target: String,
    pub rels: Vec<String>,
}

static LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([^>]*)>([^<]*)").unwrap());
static REL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:^|;)\s*rel\s*=\s*(?:"([^"]*)"|([^\s;,"]+))"#).unwrap()
});

/// Parse a `Link` header value (`<uri>; rel="next", <uri>; rel="prev"`).
pub fn parse_link_header(value: &str) -> Vec<Link> {
    LINK_RE
        .captures_iter(value)
        .map(|caps| {
            let target = caps[1].trim().to_string();
            let rels = REL_RE
                .captures(&caps[2])
                .and_then(|r| r.get(1).or_else(|| r.get(2)))
                .map(|m| {
                    m.as_str()
                        .split_whitespace()
                        .map(|rel| rel.to_ascii_lowercase())
                        .collect()
                })
                .unwrap_or_default();
            Link { target, rels }
        })
        .collect()
}

/// Find the `next` relation across all `Link` headers, resolved against the page it came from.
fn next_link(headers: &HeaderMap, base: &Url) -> Option<Url> {
    headers
        .get_all("link")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(parse_link_header)
        .find(|link| link.rels.iter().any(|rel| rel == "next"))
        .and_then(|link| base.join(&link.target).ok())
}
