//! Parsing of PV volume-attribute resource values into [`Quantity`] (§4.2.1, §6.4).
//!
//! `Quantity` itself is just a serde-friendly newtype around a `String` — `k8s-openapi` never
//! validates it. The driver must validate here, since a malformed value only fails when the API
//! server rejects the Pod create, by which point the offending field name is long gone.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// A resource-quantity field failed to parse.
#[derive(thiserror::Error, Debug)]
#[error("invalid resource quantity for field {field:?}: {raw_value:?}")]
pub struct InvalidQuantity {
    /// The PV volume-attribute key the bad value came from.
    pub field: &'static str,
    /// The raw string that failed to parse.
    pub raw_value: String,
}

/// Parse `raw_value` as a Kubernetes resource quantity, naming `field` in any error produced.
///
/// Accepts the decimal-SI and binary forms Kubernetes itself accepts: an optional leading `+`,
/// digits with an optional fractional part, and an optional unit suffix (`m`, `k`, `M`, `G`,
/// `T`, `P`, `E`, or their `Ki`/`Mi`/... binary counterparts, optionally followed by `i`).
pub fn parse_quantity(field: &'static str, raw_value: &str) -> Result<Quantity, InvalidQuantity> {
    if is_well_formed_quantity(raw_value) {
        Ok(Quantity(raw_value.to_owned()))
    } else {
        Err(InvalidQuantity {
            field,
            raw_value: raw_value.to_owned(),
        })
    }
}

/// Whether `value` looks like a syntactically valid Kubernetes resource quantity.
fn is_well_formed_quantity(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return false;
    }
    let value = value.strip_prefix('+').unwrap_or(value);
    let split_at = value
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(split_at);
    if number.is_empty() || number.matches('.').count() > 1 {
        return false;
    }
    matches!(
        suffix,
        "" | "m"
            | "k"
            | "M"
            | "G"
            | "T"
            | "P"
            | "E"
            | "Ki"
            | "Mi"
            | "Gi"
            | "Ti"
            | "Pi"
            | "Ei"
    )
}

#[cfg(test)]
mod test {
    use super::parse_quantity;

    #[test]
    fn accepts_plain_decimal() {
        assert!(parse_quantity("cpu", "0.5").is_ok());
    }

    #[test]
    fn accepts_milli_cpu() {
        assert!(parse_quantity("cpu", "500m").is_ok());
    }

    #[test]
    fn accepts_binary_memory_suffix() {
        assert!(parse_quantity("memory", "512Mi").is_ok());
    }

    #[test]
    fn rejects_garbage() {
        let err = parse_quantity("memory", "lots").unwrap_err();
        assert_eq!(err.field, "memory");
        assert_eq!(err.raw_value, "lots");
    }

    #[test]
    fn rejects_unknown_suffix() {
        assert!(parse_quantity("memory", "5Xi").is_err());
    }

    #[test]
    fn rejects_empty() {
        assert!(parse_quantity("cpu", "").is_err());
    }
}
