//! Miscilaneous *non core related* utilities

/// human readable byte count (decimal units)
pub fn sfmt(nbytes: usize) -> String {
    const PRECISION: usize = 2;
    let (unit, pow): (_, u32) = match () {
        _ if nbytes >= 10usize.pow(12) => ("TB", 12),
        _ if nbytes >= 10usize.pow(9) => ("GB", 9),
        _ if nbytes >= 10usize.pow(6) => ("MB", 6),
        _ if nbytes >= 10usize.pow(3) => ("KB", 3),
        _ => ("B", 0),
    };
    let nbytes_in_unit = nbytes as f64 / 10usize.pow(pow) as f64;
    format!("{:.*}{unit}", PRECISION, nbytes_in_unit)
}

pub(crate) fn round_up_to(n: usize, divisor: usize) -> usize {
    debug_assert!(divisor.is_power_of_two());
    (n + divisor - 1) & !(divisor - 1)
}

#[cfg(test)]
#[test]
fn sizes_format_in_decimal_units() {
    assert_eq!(sfmt(512), "512.00B");
    assert_eq!(sfmt(1_500), "1.50KB");
    assert_eq!(sfmt(64 * 1024 * 1024), "67.11MB");
}

#[cfg(test)]
#[test]
fn round_up_to_powers_of_two() {
    assert_eq!(round_up_to(0, 4096), 0);
    assert_eq!(round_up_to(1, 4096), 4096);
    assert_eq!(round_up_to(4096, 4096), 4096);
    assert_eq!(round_up_to(4097, 4096), 8192);
}
