//! Human-friendly amounts: `50k`, `1,5m`, `2.000.000`.

/// Parse an amount with an optional `k`/`m`/`t` suffix. Dots are thousands
/// separators and a comma marks decimals. Returns `None` for anything that
/// does not come out positive.
pub fn parse_amount(text: &str) -> Option<u64> {
    let normalized = text.trim().replace('.', "").replace(',', ".");
    if normalized.is_empty() {
        return None;
    }

    let (number, multiplier) = match normalized.chars().last()? {
        'k' | 'K' => (&normalized[..normalized.len() - 1], 1_000.0),
        'm' | 'M' => (&normalized[..normalized.len() - 1], 1_000_000.0),
        't' | 'T' => (&normalized[..normalized.len() - 1], 1_000_000_000.0),
        _ => (normalized.as_str(), 1.0),
    };
    let number = number.trim_end();
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }

    let value: f64 = number.parse().ok()?;
    let amount = (value * multiplier).floor();
    if amount >= 1.0 && amount < u64::MAX as f64 {
        Some(amount as u64)
    } else {
        None
    }
}

pub fn fmt_amount(value: u64) -> String {
    if value >= 1_000_000_000 {
        format!("{:.2}T", value as f64 / 1_000_000_000.0)
    } else if value >= 1_000_000 {
        format!("{:.2}M", value as f64 / 1_000_000.0)
    } else if value >= 1_000 {
        format!("{}k", value / 1_000)
    } else {
        value.to_string()
    }
}

pub fn fmt_signed(value: i64) -> String {
    let sign = if value < 0 { "-" } else { "+" };
    format!("{}{}", sign, fmt_amount(value.unsigned_abs()))
}
