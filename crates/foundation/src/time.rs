/// Milliseconds since the Unix epoch.
///
/// Browsers have no usable `SystemTime`, so wasm builds read `Date.now()`.
#[cfg(not(target_arch = "wasm32"))]
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(target_arch = "wasm32")]
pub fn unix_millis() -> u64 {
    js_sys::Date::now().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::unix_millis;

    #[test]
    fn clock_is_after_2020() {
        assert!(unix_millis() > 1_577_836_800_000);
    }
}
