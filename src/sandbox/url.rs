use url::Url;

/// Directory URL that relative resource paths of an app resolve against.
///
/// Query and fragment are dropped. A last path segment that does not look like a file
/// (`name.ext`) is treated as a directory, so `https://host/app` becomes `https://host/app/`.
pub fn effective_base(app_url: &Url) -> Url {
    let mut base = app_url.clone();
    base.set_query(None);
    base.set_fragment(None);

    let path = base.path().to_string();
    if !path.ends_with('/') && !looks_like_file(&path) {
        base.set_path(&format!("{path}/"));
    }
    base
}

fn looks_like_file(path: &str) -> bool {
    let segment = path.rsplit('/').next().unwrap_or_default();
    match segment.rsplit_once('.') {
        Some((_, ext)) => {
            !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

/// Resolves a resource URL written by app code against the app's base URL.
///
/// Empty values, protocol-relative URLs and anything already carrying a scheme are returned
/// untouched. Values that cannot be resolved are also returned untouched.
pub fn completion_path(raw: &str, base: &Url) -> String {
    if raw.is_empty() || raw.starts_with("//") || Url::parse(raw).is_ok() {
        return raw.to_string();
    }

    match base.join(raw) {
        Ok(resolved) => resolved.to_string(),
        Err(err) => {
            tracing::warn!(
                target: "sandbox",
                raw,
                base = %base,
                error = %err,
                "failed to complete URL"
            );
            raw.to_string()
        }
    }
}

/// Applies [`completion_path`] to every image candidate of a `srcset` value, keeping descriptors.
pub fn completion_srcset(raw: &str, base: &Url) -> String {
    let mut candidates = Vec::new();
    let mut rest = raw;

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == ',');
        if rest.is_empty() {
            break;
        }

        let url_end = rest
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(rest.len());
        let (url, after_url) = rest.split_at(url_end);

        // A URL glued to the next candidate ("a.png,b.png") ends at its trailing commas.
        let trimmed_url = url.trim_end_matches(',');
        if trimmed_url.len() != url.len() {
            candidates.push(completion_path(trimmed_url, base));
            rest = &rest[trimmed_url.len()..];
            continue;
        }

        let descriptor_end = after_url.find(',').unwrap_or(after_url.len());
        let descriptor = after_url[..descriptor_end].trim();
        let resolved = completion_path(url, base);
        if descriptor.is_empty() {
            candidates.push(resolved);
        } else {
            candidates.push(format!("{resolved} {descriptor}"));
        }
        rest = &after_url[descriptor_end..];
    }

    candidates.join(", ")
}
