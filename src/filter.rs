use clap::ValueEnum;
use reqwest::Url;

/// Sites whose bookmarks count as papers.
pub const DEFAULT_SITES: &[&str] = &[
    "aaai.org",
    "ametsoc.org",
    "arxiv.org",
    "copernicus.org",
    "dl.acm.org",
    "iclr.cc",
    "icml.cc",
    "ieeexplore.ieee.org",
    "mdpi.org",
    "nature.com",
    "nips.cc",
    "onlinelibrary.wiley.com",
    "openaccess.thecvf.com",
    "openreview.net",
    "researchsquare.com",
    "science.org",
    "sciencedirect.com",
    "semanticscholar.org",
    "www.nature.com",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MatchMode {
    /// Allow-list entry appears anywhere in the URL
    Substring,
    /// URL host equals an allow-list entry
    Hostname,
}

pub struct SiteFilter {
    sites: Vec<String>,
    mode: MatchMode,
}

impl SiteFilter {
    pub fn new(sites: Vec<String>, mode: MatchMode) -> Self {
        Self { sites, mode }
    }

    pub fn accepts(&self, url: &str) -> bool {
        match self.mode {
            MatchMode::Substring => self.sites.iter().any(|s| url.contains(s.as_str())),
            MatchMode::Hostname => match hostname(url) {
                Some(host) => self.sites.iter().any(|s| *s == host),
                None => false,
            },
        }
    }
}

pub fn hostname(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}
