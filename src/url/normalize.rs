use url::Url;

/// Query parameters that change between loads of the same page
pub const VOLATILE_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "mc_eid",
    "ref",
    "ref_",
    "source",
    "qid",
    "sr",
    "th",
    "psc",
    "_encoding",
    "sessionid",
    "timestamp",
];

/// Reduces a URL to the part that identifies the page being shown
///
/// Used to decide whether a freshly started context sits on a different page than the one
/// processed last. The result is a comparison key, not a URL meant to be loaded.
///
/// # Steps
///
/// 1. Drop the `www.` host prefix (the host is already lowercase after parsing)
/// 2. Collapse empty and dot path segments, drop a trailing slash
/// 3. Drop the fragment
/// 4. Drop volatile parameters, `utm_*`, and anything listed in `extra`
/// 5. Sort the remaining query parameters
///
/// # Examples
///
/// ```
/// use review_sweep::url::strip_volatile;
/// use url::Url;
///
/// let url = Url::parse("https://www.shop.example/r/B01/?pageNumber=3&utm_source=x#top").unwrap();
/// assert_eq!(strip_volatile(&url, &["pageNumber"]), "https://shop.example/r/B01");
/// ```
pub fn strip_volatile(url: &Url, extra: &[&str]) -> String {
    let mut key = format!("{}://", url.scheme());

    if let Some(host) = url.host_str() {
        key.push_str(host.strip_prefix("www.").unwrap_or(host));
    }
    if let Some(port) = url.port() {
        key.push_str(&format!(":{}", port));
    }

    key.push_str(&normalize_path(url.path()));

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !is_volatile(name, extra))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    params.sort();

    if !params.is_empty() {
        let query = params
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("&");
        key.push('?');
        key.push_str(&query);
    }

    key
}

fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    format!("/{}", segments.join("/"))
}

fn is_volatile(name: &str, extra: &[&str]) -> bool {
    name.starts_with("utm_") || VOLATILE_PARAMS.contains(&name) || extra.contains(&name)
}
