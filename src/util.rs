use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use http::{HeaderMap, Uri};

use crate::error::{Error, TransportErrorKind};

const MAX_ERROR_BODY_LEN: usize = 2048;

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) fn redact_uri_for_logs(uri_text: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(uri_text) else {
        return uri_text.split('?').next().unwrap_or(uri_text).to_owned();
    };

    let _ = parsed.set_username("");
    let _ = parsed.set_password(None);
    parsed.set_query(None);
    parsed.set_fragment(None);
    parsed.to_string()
}

fn is_http_scheme(scheme: &str) -> bool {
    scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
}

/// Absolute http(s) targets are kept as given; anything else is joined onto
/// the base URL. A bare segment such as `users` parses as an authority, so a
/// target only counts as absolute when it carries both scheme and host.
pub(crate) fn resolve_uri(base_url: Option<&str>, path: &str) -> Result<Uri, Error> {
    let uri_text = match path.parse::<Uri>() {
        Ok(uri) if uri.scheme().is_some() && uri.host().is_some() => match uri.scheme_str() {
            Some(scheme) if is_http_scheme(scheme) => path.to_owned(),
            _ => {
                return Err(Error::InvalidUri {
                    uri: path.to_owned(),
                });
            }
        },
        _ => match base_url {
            Some(base_url) => join_base_path(base_url, path),
            None => {
                return Err(Error::InvalidUri {
                    uri: path.to_owned(),
                });
            }
        },
    };
    uri_text.parse().map_err(|_| Error::InvalidUri { uri: uri_text })
}

pub(crate) fn validate_base_url(base_url: &str) -> Result<(), Error> {
    let invalid = || Error::InvalidUri {
        uri: base_url.to_owned(),
    };
    if base_url.trim().len() != base_url.len() || base_url.is_empty() {
        return Err(invalid());
    }

    let parsed = url::Url::parse(base_url).map_err(|_| invalid())?;
    if !is_http_scheme(parsed.scheme()) || parsed.host_str().is_none() {
        return Err(invalid());
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(invalid());
    }
    Ok(())
}

pub(crate) fn join_base_path(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let relative = path.trim_start_matches('/');
    match (base.is_empty(), relative.is_empty()) {
        (true, true) => String::new(),
        (true, false) => relative.to_owned(),
        (false, true) => base.to_owned(),
        (false, false) => format!("{base}/{relative}"),
    }
}

/// Appends encoded pairs after any query already present on `uri`.
pub(crate) fn append_query_pairs(uri: &Uri, query_pairs: &[(String, String)]) -> Result<Uri, Error> {
    if query_pairs.is_empty() {
        return Ok(uri.clone());
    }

    let uri_text = uri.to_string();
    let mut url = url::Url::parse(&uri_text).map_err(|_| Error::InvalidUri {
        uri: uri_text.clone(),
    })?;
    {
        let mut serializer = url.query_pairs_mut();
        for (name, value) in query_pairs {
            serializer.append_pair(name, value);
        }
    }
    url.as_str().parse().map_err(|_| Error::InvalidUri {
        uri: url.to_string(),
    })
}

pub(crate) fn parse_header_name(name: &str) -> Result<HeaderName, Error> {
    name.parse().map_err(|source| Error::InvalidHeaderName {
        name: name.to_owned(),
        source,
    })
}

pub(crate) fn parse_header_value(name: &str, value: &str) -> Result<HeaderValue, Error> {
    value.parse().map_err(|source| Error::InvalidHeaderValue {
        name: name.to_owned(),
        source,
    })
}

pub(crate) fn sensitive_header_value(name: &str, value: &str) -> Result<HeaderValue, Error> {
    let mut value = parse_header_value(name, value)?;
    value.set_sensitive(true);
    Ok(value)
}

pub(crate) fn parse_retry_after(headers: &HeaderMap, now: SystemTime) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?;
    let raw_value = value.to_str().ok()?.trim();
    if let Ok(seconds) = raw_value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = httpdate::parse_http_date(raw_value).ok()?;
    match date.duration_since(now) {
        Ok(duration) => Some(duration),
        Err(_) => Some(Duration::ZERO),
    }
}

pub(crate) fn classify_transport_error(
    error: &hyper_util::client::legacy::Error,
) -> TransportErrorKind {
    let text = error.to_string().to_ascii_lowercase();
    if error.is_connect() {
        if text.contains("dns")
            || text.contains("name or service not known")
            || text.contains("failed to lookup address")
        {
            return TransportErrorKind::Dns;
        }
        if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
            return TransportErrorKind::Tls;
        }
        return TransportErrorKind::Connect;
    }

    if text.contains("read")
        || text.contains("connection reset")
        || text.contains("broken pipe")
        || text.contains("unexpected eof")
    {
        return TransportErrorKind::Read;
    }

    TransportErrorKind::Other
}

pub(crate) fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.chars().count() <= MAX_ERROR_BODY_LEN {
        return text.into_owned();
    }

    let truncated: String = text.chars().take(MAX_ERROR_BODY_LEN).collect();
    format!("{truncated}...(truncated)")
}
