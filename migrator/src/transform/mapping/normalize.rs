//! Field-level normalizers.
//!
//! Every function here is total: bad input yields a documented fallback and,
//! where the fallback hides source data, a warning message explaining it.
//! Callers turn those messages into `TransformationWarning` issues.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::transform::context::HandleRegistry;

/// Price used when the source price is missing, non-numeric or not positive.
pub const FLOOR_PRICE: &str = "0.01";

/// Inventory used when the quantity is missing and the product is in stock.
pub const DEFAULT_STOCK_IN_STOCK: u32 = 100;

/// Inventory used when the quantity is missing and the product is not in stock.
pub const DEFAULT_STOCK_OUT_OF_STOCK: u32 = 10;

/// Longest handle Shopify accepts.
const MAX_HANDLE_LEN: usize = 255;

pub const SEO_TITLE_MAX: usize = 70;
pub const SEO_DESCRIPTION_MAX: usize = 160;

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^https?://(?:(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,6}\.?|localhost|\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})(?::\d+)?(?:/?|[/?]\S+)$",
    )
    .expect("static regex")
});
static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("static regex"));
static BR_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(<br>\s*){3,}").expect("static regex"));
static EMPTY_P_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<p>\s*</p>").expect("static regex"));
static TRAILING_BR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\s*<br>)+\s*$").expect("static regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("static regex"));

/// A normalized value plus the warning explaining any fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub value: T,
    pub warning: Option<String>,
}

impl<T> Normalized<T> {
    fn clean(value: T) -> Self {
        Self { value, warning: None }
    }

    fn fallback(value: T, warning: impl Into<String>) -> Self {
        Self {
            value,
            warning: Some(warning.into()),
        }
    }
}

// =============================================================================
// Prices
// =============================================================================

/// A parsed decimal and whether its separator could be read either way.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ParsedDecimal {
    value: f64,
    ambiguous: bool,
}

/// Parse a human-written decimal: currency symbols and letters are ignored.
///
/// With both `.` and `,` present the rightmost one is the decimal separator.
/// A separator repeated on its own is a thousands separator. A lone `,`
/// followed by exactly 3 digits reads as thousands, a lone `.` as decimal;
/// both are flagged ambiguous.
fn parse_decimal(raw: &str) -> Option<ParsedDecimal> {
    let trimmed = raw.trim();
    let negative = trimmed.starts_with('-') || (trimmed.starts_with('(') && trimmed.ends_with(')'));

    let digits: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if !digits.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let dots = digits.matches('.').count();
    let commas = digits.matches(',').count();
    let (decimal, ambiguous) = match (digits.rfind('.'), digits.rfind(',')) {
        (Some(dot), Some(comma)) => {
            let (separator, count) = if dot > comma { ('.', dots) } else { (',', commas) };
            if count > 1 {
                return None;
            }
            (Some(separator), false)
        }
        (Some(_), None) if dots > 1 => (None, false),
        (None, Some(_)) if commas > 1 => (None, false),
        (Some(pos), None) => (Some('.'), digits.len() - pos - 1 == 3),
        (None, Some(pos)) => {
            if digits.len() - pos - 1 == 3 {
                (None, true)
            } else {
                (Some(','), false)
            }
        }
        (None, None) => (None, false),
    };

    let number: String = digits
        .chars()
        .filter_map(|c| match c {
            '.' | ',' if Some(c) == decimal => Some('.'),
            '.' | ',' => None,
            other => Some(other),
        })
        .collect();

    let value: f64 = number.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(ParsedDecimal {
        value: if negative { -value } else { value },
        ambiguous,
    })
}

/// Round to cents, `None` when the result is not strictly positive.
fn positive_cents(value: f64) -> Option<String> {
    let cents = (value * 100.0).round() / 100.0;
    (cents > 0.0).then(|| format!("{:.2}", cents))
}

/// Normalize a price to a decimal string with exactly 2 fractional digits.
///
/// Non-numeric or non-positive input yields [`FLOOR_PRICE`] with a warning.
pub fn normalize_price(raw: &str) -> Normalized<String> {
    if raw.trim().is_empty() {
        return Normalized::fallback(
            FLOOR_PRICE.to_string(),
            format!("price is missing, using floor price {}", FLOOR_PRICE),
        );
    }
    match parse_decimal(raw) {
        Some(parsed) => match positive_cents(parsed.value) {
            Some(price) if parsed.ambiguous => Normalized::fallback(
                price.clone(),
                format!("price '{}' has an ambiguous separator, read as {}", raw.trim(), price),
            ),
            Some(price) => Normalized::clean(price),
            None => Normalized::fallback(
                FLOOR_PRICE.to_string(),
                format!("price '{}' is not positive, using floor price {}", raw.trim(), FLOOR_PRICE),
            ),
        },
        None => Normalized::fallback(
            FLOOR_PRICE.to_string(),
            format!("price '{}' is not numeric, using floor price {}", raw.trim(), FLOOR_PRICE),
        ),
    }
}

/// Normalize a compare-at price. Unusable values are dropped, not floored.
pub fn normalize_compare_at_price(raw: &str) -> Normalized<Option<String>> {
    let parsed = parse_decimal(raw);
    match parsed.and_then(|p| positive_cents(p.value)) {
        Some(price) if parsed.is_some_and(|p| p.ambiguous) => Normalized::fallback(
            Some(price.clone()),
            format!("compare-at price '{}' has an ambiguous separator, read as {}", raw.trim(), price),
        ),
        Some(price) => Normalized::clean(Some(price)),
        None => Normalized::fallback(
            None,
            format!("compare-at price '{}' is not a positive number, dropped", raw.trim()),
        ),
    }
}

// =============================================================================
// Handles
// =============================================================================

fn fold_accent(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'æ' => "ae",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
        'œ' => "oe",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'ß' => "ss",
        _ => return None,
    };
    Some(folded)
}

/// Lowercase URL slug: runs of anything but `[a-z0-9]` become one hyphen,
/// edges trimmed. Common Latin accents are folded first.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.trim().to_lowercase().chars() {
        let piece = if c.is_ascii_alphanumeric() {
            None
        } else if let Some(folded) = fold_accent(c) {
            Some(folded)
        } else {
            pending_hyphen = true;
            continue;
        };

        if pending_hyphen && !slug.is_empty() {
            slug.push('-');
        }
        pending_hyphen = false;
        match piece {
            Some(folded) => slug.push_str(folded),
            None => slug.push(c),
        }
    }

    if slug.len() > MAX_HANDLE_LEN {
        slug.truncate(MAX_HANDLE_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// Slugify a title and reserve it in the run's handle registry,
/// suffixing `-2`, `-3`, … on collision.
pub fn normalize_handle(title: &str, registry: &mut HandleRegistry) -> String {
    registry.claim(&slugify(title))
}

// =============================================================================
// Booleans, status, inventory
// =============================================================================

/// Normalize to `"TRUE"` / `"FALSE"`.
pub fn normalize_boolean(raw: &str) -> Normalized<&'static str> {
    match raw.trim().to_lowercase().as_str() {
        "yes" | "true" | "1" => Normalized::clean("TRUE"),
        "no" | "false" | "0" => Normalized::clean("FALSE"),
        _ => Normalized::fallback(
            "FALSE",
            format!("'{}' is not a recognized boolean, using FALSE", raw.trim()),
        ),
    }
}

/// Lenient flag parsing for configuration-driven switches. Never warns.
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "yes" | "y" | "true" | "1" | "in stock" | "instock" | "available"
    )
}

/// Normalize a product status to `active` / `draft` / `archived`.
pub fn normalize_status(raw: &str) -> Normalized<&'static str> {
    match raw.trim().to_lowercase().as_str() {
        "active" | "true" | "1" | "yes" | "y" | "published" => Normalized::clean("active"),
        "draft" | "false" | "0" | "no" | "n" | "inactive" => Normalized::clean("draft"),
        "archived" => Normalized::clean("archived"),
        _ => Normalized::fallback(
            "draft",
            format!("unknown status '{}', using draft", raw.trim()),
        ),
    }
}

/// Normalize "continue selling when out of stock" to `deny` / `continue`.
pub fn normalize_inventory_policy(raw: &str) -> Normalized<&'static str> {
    match raw.trim().to_lowercase().as_str() {
        "continue" | "allow" | "true" | "1" | "yes" | "y" => Normalized::clean("continue"),
        "deny" | "false" | "0" | "no" | "n" | "" => Normalized::clean("deny"),
        _ => Normalized::fallback(
            "deny",
            format!("unknown inventory policy '{}', using deny", raw.trim()),
        ),
    }
}

/// Normalize an inventory tracker: `shopify`, or blank when not tracked.
pub fn normalize_inventory_tracker(raw: &str) -> &'static str {
    let value = raw.trim().to_lowercase();
    match value.as_str() {
        "0" | "false" | "no" | "none" | "not tracked" | "not_tracked" => "",
        _ => "shopify",
    }
}

/// Normalize an inventory quantity to a non-negative integer.
///
/// Missing or invalid input defaults to [`DEFAULT_STOCK_IN_STOCK`] when the
/// product is flagged in stock, [`DEFAULT_STOCK_OUT_OF_STOCK`] otherwise.
pub fn normalize_inventory(raw: Option<&str>, in_stock: bool) -> Normalized<u32> {
    let default = if in_stock {
        DEFAULT_STOCK_IN_STOCK
    } else {
        DEFAULT_STOCK_OUT_OF_STOCK
    };

    let raw = raw.map(str::trim).unwrap_or("");
    if raw.is_empty() {
        return Normalized::fallback(
            default,
            format!("inventory quantity is missing, using {}", default),
        );
    }

    match raw.parse::<f64>() {
        Ok(qty) if qty.is_finite() && qty >= 0.0 && qty <= u32::MAX as f64 => {
            Normalized::clean(qty.trunc() as u32)
        }
        _ => Normalized::fallback(
            default,
            format!("inventory quantity '{}' is invalid, using {}", raw, default),
        ),
    }
}

/// Normalize a weight in grams to a non-negative integer; invalid values are dropped.
pub fn normalize_grams(raw: &str) -> Normalized<Option<String>> {
    match raw.trim().parse::<f64>() {
        Ok(grams) if grams.is_finite() && grams >= 0.0 => {
            Normalized::clean(Some(format!("{}", grams.round() as u64)))
        }
        _ => Normalized::fallback(None, format!("weight '{}' is not a valid gram value, dropped", raw.trim())),
    }
}

// =============================================================================
// Tags, URLs, text
// =============================================================================

/// Join tags with `,`: each input may itself hold `;` or `,` separated tags.
/// Trimmed, empty tags dropped, case-insensitive duplicates removed, first
/// spelling and insertion order kept.
pub fn normalize_tags<S: AsRef<str>>(raws: &[S]) -> String {
    let mut seen: Vec<String> = Vec::new();
    let mut tags: Vec<&str> = Vec::new();

    for raw in raws {
        for tag in raw.as_ref().split([';', ',']).map(str::trim) {
            if tag.is_empty() {
                continue;
            }
            let key = tag.to_lowercase();
            if !seen.contains(&key) {
                seen.push(key);
                tags.push(tag);
            }
        }
    }
    tags.join(",")
}

/// `Some(url)` when the value looks like an absolute http(s) URL.
pub fn normalize_image_url(raw: &str) -> Option<String> {
    let url = raw.trim();
    URL_RE.is_match(url).then(|| url.to_string())
}

/// Split an image cell holding one or more comma-separated URLs.
///
/// Returns `(valid, rejected)`, both in cell order.
pub fn split_image_cell(raw: &str) -> (Vec<String>, Vec<String>) {
    let mut valid = Vec::new();
    let mut rejected = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match normalize_image_url(part) {
            Some(url) => valid.push(url),
            None => rejected.push(part.to_string()),
        }
    }
    (valid, rejected)
}

/// Clean a product description into import-safe HTML.
pub fn normalize_body_html(raw: &str) -> String {
    let text = raw.trim().replace("\\n", "\n");

    let html = if text.contains('<') && text.contains('>') {
        let mut lines: Vec<&str> = Vec::new();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let has_markup = line.contains('<') && line.contains('>');
            if !has_markup && lines.last().is_some_and(|prev| !prev.ends_with('>')) {
                lines.push("<br>");
            }
            lines.push(line);
        }
        lines.join("\n")
    } else {
        let paragraphs: Vec<&str> = text.lines().map(str::trim).filter(|p| !p.is_empty()).collect();
        if paragraphs.is_empty() {
            String::new()
        } else {
            format!("<p>{}</p>", paragraphs.join("</p>\n<p>"))
        }
    };

    let html = SCRIPT_RE.replace_all(&html, "");
    let html = BR_RUN_RE.replace_all(&html, "<br><br>");
    let html = EMPTY_P_RE.replace_all(&html, "");
    let html = TRAILING_BR_RE.replace_all(&html, "");
    html.trim().to_string()
}

/// Strip markup and cap an SEO field at `max_chars` characters.
pub fn normalize_seo(raw: &str, max_chars: usize) -> String {
    let text = TAG_RE.replace_all(raw, "");
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].trim_end().to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_strips_symbols_and_formats() {
        assert_eq!(normalize_price("$19.99"), Normalized::clean("19.99".to_string()));
        assert_eq!(normalize_price("29.5").value, "29.50");
        assert_eq!(normalize_price("10").value, "10.00");
        assert_eq!(normalize_price("1,299.00 USD").value, "1299.00");
        assert_eq!(normalize_price("19,99 €").value, "19.99");
    }

    #[test]
    fn test_price_mixed_separators() {
        assert_eq!(normalize_price("1.234,56 €"), Normalized::clean("1234.56".to_string()));
        assert_eq!(normalize_price("1,234,567.8").value, "1234567.80");
        assert_eq!(normalize_price("1.234.567,8").value, "1234567.80");
        assert_eq!(normalize_price("2.500.000").value, "2500000.00");
        assert_eq!(normalize_price("1,2.3,4").value, FLOOR_PRICE);
    }

    #[test]
    fn test_price_ambiguous_separator_warns() {
        let comma = normalize_price("1,234");
        assert_eq!(comma.value, "1234.00");
        assert!(comma.warning.unwrap().contains("ambiguous"));

        let dot = normalize_price("1.234");
        assert_eq!(dot.value, "1.23");
        assert!(dot.warning.unwrap().contains("ambiguous"));

        let compare_at = normalize_compare_at_price("2,500");
        assert_eq!(compare_at.value.as_deref(), Some("2500.00"));
        assert!(compare_at.warning.is_some());
    }

    #[test]
    fn test_price_floor() {
        for raw in ["abc", "", "0", "-5", "0.001"] {
            let price = normalize_price(raw);
            assert_eq!(price.value, FLOOR_PRICE, "input {:?}", raw);
            assert!(price.warning.is_some(), "input {:?}", raw);
        }
    }

    #[test]
    fn test_compare_at_price_dropped_when_invalid() {
        assert_eq!(normalize_compare_at_price("24.5").value, Some("24.50".to_string()));
        let dropped = normalize_compare_at_price("n/a");
        assert_eq!(dropped.value, None);
        assert!(dropped.warning.is_some());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("My Product Name"), "my-product-name");
        assert_eq!(slugify("Product #1!"), "product-1");
        assert_eq!(slugify("  --Shirt--  "), "shirt");
        assert_eq!(slugify("Café Crème"), "cafe-creme");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_handle_dedup() {
        let mut registry = HandleRegistry::default();
        assert_eq!(normalize_handle("Shirt", &mut registry), "shirt");
        assert_eq!(normalize_handle("shirt!", &mut registry), "shirt-2");
        assert_eq!(normalize_handle("SHIRT", &mut registry), "shirt-3");
        assert_eq!(normalize_handle("Pants", &mut registry), "pants");
    }

    #[test]
    fn test_boolean() {
        assert_eq!(normalize_boolean("Yes").value, "TRUE");
        assert_eq!(normalize_boolean("1").value, "TRUE");
        assert_eq!(normalize_boolean("false").value, "FALSE");
        assert_eq!(normalize_boolean("0").warning, None);

        let unknown = normalize_boolean("maybe");
        assert_eq!(unknown.value, "FALSE");
        assert!(unknown.warning.is_some());
    }

    #[test]
    fn test_tags_dedup_preserves_order() {
        assert_eq!(normalize_tags(&["tag1; tag2; tag3"]), "tag1,tag2,tag3");
        assert_eq!(normalize_tags(&["Summer, sale", "summer", " New "]), "Summer,sale,New");
        assert_eq!(normalize_tags::<&str>(&[]), "");
    }

    #[test]
    fn test_inventory() {
        assert_eq!(normalize_inventory(Some("100"), false), Normalized::clean(100));
        assert_eq!(normalize_inventory(Some("50.5"), false).value, 50);

        let missing = normalize_inventory(None, false);
        assert_eq!(missing.value, DEFAULT_STOCK_OUT_OF_STOCK);
        assert!(missing.warning.is_some());

        let invalid = normalize_inventory(Some("-3"), true);
        assert_eq!(invalid.value, DEFAULT_STOCK_IN_STOCK);
        assert!(invalid.warning.is_some());
    }

    #[test]
    fn test_image_urls() {
        assert_eq!(
            normalize_image_url(" https://cdn.example.com/a.jpg "),
            Some("https://cdn.example.com/a.jpg".to_string())
        );
        assert_eq!(normalize_image_url("cdn.example.com/a.jpg"), None);
        assert_eq!(normalize_image_url("ftp://example.com/a.jpg"), None);

        let (valid, rejected) =
            split_image_cell("https://a.example.com/1.jpg, not-a-url ,http://localhost:8080/2.png");
        assert_eq!(valid.len(), 2);
        assert_eq!(rejected, vec!["not-a-url".to_string()]);
    }

    #[test]
    fn test_status_and_policy() {
        assert_eq!(normalize_status("Published").value, "active");
        assert_eq!(normalize_status("FALSE").value, "draft");
        assert!(normalize_status("pending").warning.is_some());
        assert_eq!(normalize_inventory_policy("allow").value, "continue");
        assert_eq!(normalize_inventory_policy("").value, "deny");
        assert_eq!(normalize_inventory_tracker("not tracked"), "");
        assert_eq!(normalize_inventory_tracker("Shopify"), "shopify");
    }

    #[test]
    fn test_body_html() {
        assert_eq!(normalize_body_html("First line\\nSecond line"), "<p>First line</p>\n<p>Second line</p>");
        assert_eq!(
            normalize_body_html("<p>Hi</p><script>alert(1)</script>"),
            "<p>Hi</p>"
        );
        assert_eq!(normalize_body_html("   "), "");
    }

    #[test]
    fn test_seo_truncation() {
        let long = "a".repeat(100);
        assert_eq!(normalize_seo(&long, SEO_TITLE_MAX).chars().count(), SEO_TITLE_MAX);
        assert_eq!(normalize_seo("<b>Bold</b> claim", SEO_TITLE_MAX), "Bold claim");
    }

    #[test]
    fn test_grams() {
        assert_eq!(normalize_grams("250.4").value, Some("250".to_string()));
        assert_eq!(normalize_grams("heavy").value, None);
    }
}
