/// Token usage block a provider's JSON response carries, in whatever
/// shape `extract_usage` pulled it into (OpenAI-wire naming, which the
/// `custom` driver also assumes since it targets OpenAI-compatible
/// third parties).
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
}

/// Turns a token usage block into a reported cost in USD micros, using the
/// per-1k pricing the registry resolved alongside the driver (spec.md §4.1
/// stage 10 "extract reported cost").
pub fn reported_cost_usd_micros(
    usage: TokenUsage,
    input_price_per_1k_usd_micros: i64,
    output_price_per_1k_usd_micros: i64,
) -> i64 {
    let input_cost = usage.prompt_tokens * input_price_per_1k_usd_micros / 1000;
    let output_cost = usage.completion_tokens * output_price_per_1k_usd_micros / 1000;
    input_cost + output_cost
}

/// Best-effort extraction of `{"usage": {"prompt_tokens", "completion_tokens"}}`
/// from an OpenAI-wire-compatible JSON body. Returns `None` on any shape
/// mismatch so the caller can fall back to a configured estimate.
pub fn extract_usage(body: &[u8]) -> Option<TokenUsage> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let usage = value.get("usage")?;
    Some(TokenUsage {
        prompt_tokens: usage.get("prompt_tokens")?.as_i64().unwrap_or(0),
        completion_tokens: usage.get("completion_tokens")?.as_i64().unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_cost_from_priced_tokens() {
        let usage = TokenUsage { prompt_tokens: 1000, completion_tokens: 500 };
        let cost = reported_cost_usd_micros(usage, 2_000, 4_000);
        assert_eq!(cost, 2_000 + 2_000);
    }

    #[test]
    fn extracts_usage_from_an_openai_shaped_body() {
        let body = br#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":34}}"#;
        let usage = extract_usage(body).unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 34);
    }

    #[test]
    fn missing_usage_block_returns_none() {
        assert!(extract_usage(b"{}").is_none());
    }
}
