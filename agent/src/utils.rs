// Small shared helpers.

/// Restricts a VIN to filesystem-safe characters for per-vehicle file names.
pub fn sanitize_vin(vin: &str) -> String {
    vin.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
