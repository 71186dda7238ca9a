use crate::config::ImageFormat;
use crate::error::ImageError;
use mime::Mime;

/// One weighted entry of an `Accept` header.
#[derive(Debug, Clone, PartialEq)]
struct MediaRange {
    type_: String,
    subtype: String,
    weight: f32,
}

impl MediaRange {
    /// 2 for `type/subtype`, 1 for `type/*`, 0 for `*/*`; `None` if the
    /// range does not cover `format`.
    fn specificity_for(&self, format: ImageFormat) -> Option<u8> {
        let (type_, subtype) = format
            .content_type()
            .split_once('/')
            .unwrap_or((format.content_type(), ""));
        match (self.type_.as_str(), self.subtype.as_str()) {
            ("*", "*") => Some(0),
            (t, "*") if t == type_ => Some(1),
            (t, s) if t == type_ && s == subtype => Some(2),
            _ => None,
        }
    }
}

fn parse_accept(header: &str) -> Result<Vec<MediaRange>, ImageError> {
    let mut ranges = Vec::new();
    for raw in header.split(',').map(str::trim).filter(|r| !r.is_empty()) {
        let parsed: Mime = raw
            .parse()
            .map_err(|e| ImageError::NotAcceptable(format!("malformed media range `{}`: {}", raw, e)))?;

        let type_ = parsed.type_().as_str().to_ascii_lowercase();
        let subtype = parsed.subtype().as_str().to_ascii_lowercase();
        if type_ == "*" && subtype != "*" {
            return Err(ImageError::NotAcceptable(format!("malformed media range `{}`", raw)));
        }

        let weight = match parsed.get_param("q") {
            Some(q) => q
                .as_str()
                .parse::<f32>()
                .ok()
                .filter(|w| (0.0..=1.0).contains(w))
                .ok_or_else(|| ImageError::NotAcceptable(format!("invalid weight in `{}`", raw)))?,
            None => 1.0,
        };

        ranges.push(MediaRange { type_, subtype, weight });
    }
    Ok(ranges)
}

/// Picks the output format for a request from its `Accept` header.
///
/// A missing or blank header accepts anything, so the first supported
/// format wins. Otherwise each supported format is weighted by the most
/// specific range that covers it; the heaviest non-zero weight wins and
/// ties fall back to the order of `supported`.
pub fn negotiate(accept: Option<&str>, supported: &[ImageFormat]) -> Result<ImageFormat, ImageError> {
    let header = accept.map(str::trim).unwrap_or("");
    if header.is_empty() {
        return supported
            .first()
            .copied()
            .ok_or_else(|| ImageError::NotAcceptable("no supported formats".into()));
    }

    let ranges = parse_accept(header)?;

    let mut best: Option<(ImageFormat, f32)> = None;
    for &format in supported {
        let weight = ranges
            .iter()
            .filter_map(|r| r.specificity_for(format).map(|s| (s, r.weight)))
            .max_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)))
            .map(|(_, w)| w)
            .unwrap_or(0.0);

        if weight <= 0.0 {
            continue;
        }
        if best.map_or(true, |(_, w)| weight > w) {
            best = Some((format, weight));
        }
    }

    best.map(|(format, _)| format)
        .ok_or_else(|| ImageError::NotAcceptable(format!("nothing acceptable in `{}`", header)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pick(accept: &str) -> Result<ImageFormat, ImageError> {
        negotiate(Some(accept), &ImageFormat::SUPPORTED)
    }

    #[test]
    fn exact_range_beats_wildcard() {
        assert_eq!(pick("image/*;q=0.1, image/jpeg").unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn zero_weight_excludes() {
        assert_eq!(pick("image/webp;q=0, image/*").unwrap(), ImageFormat::Png);
    }

    #[test]
    fn bad_weight_is_rejected() {
        assert!(matches!(pick("image/webp;q=2"), Err(ImageError::NotAcceptable(_))));
        assert!(matches!(pick("image/webp;q=abc"), Err(ImageError::NotAcceptable(_))));
    }
}
