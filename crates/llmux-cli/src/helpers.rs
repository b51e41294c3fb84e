//! Shared CLI helpers: path expansion, argument parsing, response printing.

use std::path::PathBuf;

use colored::Colorize;

use llmux_core::types::CanonicalResponse;
use llmux_engine::StatsSnapshot;

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs_next::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Parse a `name=value` template variable.
pub fn parse_var(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected name=value, got '{s}'")),
    }
}

pub fn format_cost(cost: f64, currency: &str) -> String {
    format!("{cost:.6} {currency}")
}

fn usage_line(response: &CanonicalResponse, currency: &str) -> String {
    let mut line = format!(
        "{} in / {} out tokens · {} · {} ms",
        response.usage.input_tokens,
        response.usage.output_tokens,
        format_cost(response.cost, currency),
        response.response_time_ms,
    );
    if response.usage.cached_tokens > 0 {
        line.push_str(&format!(" · {} cached input", response.usage.cached_tokens));
    }
    if response.cached {
        line.push_str(" · from cache");
    }
    line
}

/// Print a single answer followed by its usage line.
pub fn print_response(response: &CanonicalResponse, currency: &str) {
    if let Some(ref err) = response.error {
        eprintln!("{} {}", "✗".red(), err.red());
        return;
    }
    if response.content.is_empty() {
        println!("{}", "(no response)".dimmed());
    } else {
        println!("{}", response.content);
    }
    eprintln!();
    eprintln!(
        "{} {}",
        label(response).cyan().bold(),
        usage_line(response, currency).dimmed()
    );
}

/// Print one `compare` result under a header naming its target.
pub fn print_labeled(target: &str, response: &CanonicalResponse, currency: &str) {
    println!();
    match response.error {
        Some(ref err) => {
            println!("{} {}", "✗".red(), target.bold());
            println!("  {}", err.red());
        }
        None => {
            println!("{} {} {}", "✓".green(), target.bold(), format!("({})", label(response)).dimmed());
            println!("{}", response.content);
            println!("  {}", usage_line(response, currency).dimmed());
        }
    }
}

/// Totals for a batch.
pub fn print_summary(stats: &StatsSnapshot, currency: &str) {
    println!();
    println!(
        "{} {} requests, {} errors, {} cache hits · {} in / {} out tokens · {}",
        "Σ".cyan().bold(),
        stats.requests,
        stats.errors,
        stats.cache_hits,
        stats.input_tokens,
        stats.output_tokens,
        format_cost(stats.total_cost, currency),
    );
    if !stats.unpriced_models.is_empty() {
        let models: Vec<&str> = stats.unpriced_models.iter().map(String::as_str).collect();
        println!("  {}", format!("no pricing for: {}", models.join(", ")).yellow());
    }
}

fn label(response: &CanonicalResponse) -> String {
    match (response.provider.as_deref(), response.model.as_deref()) {
        (Some(provider), Some(model)) => format!("{provider}/{model}"),
        (Some(provider), None) => provider.to_string(),
        _ => "llmux".to_string(),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use llmux_core::types::Usage;

    #[test]
    fn expand_tilde_home() {
        let result = expand_tilde("~/foo/bar");
        assert!(result.ends_with("foo/bar"));
        assert!(!result.starts_with("~"));
    }

    #[test]
    fn expand_tilde_no_tilde() {
        assert_eq!(expand_tilde("/absolute/path"), PathBuf::from("/absolute/path"));
        assert_eq!(expand_tilde("relative/path"), PathBuf::from("relative/path"));
    }

    #[test]
    fn parse_var_pairs() {
        assert_eq!(parse_var("name=World").unwrap(), ("name".into(), "World".into()));
        assert_eq!(parse_var("eq=a=b").unwrap(), ("eq".into(), "a=b".into()));
        assert_eq!(parse_var("empty=").unwrap(), ("empty".into(), String::new()));
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }

    #[test]
    fn usage_line_mentions_cache() {
        let response = CanonicalResponse {
            usage: Usage::new(1000, 500, 200),
            cost: 0.0012,
            cached: true,
            response_time_ms: 42,
            ..Default::default()
        };
        let line = usage_line(&response, "USD");
        assert!(line.starts_with("1000 in / 500 out tokens"));
        assert!(line.contains("0.001200 USD"));
        assert!(line.contains("200 cached input"));
        assert!(line.ends_with("from cache"));
    }

    #[test]
    fn label_falls_back() {
        let response = CanonicalResponse::default().attributed(Some("grok"), Some("grok-3-mini"));
        assert_eq!(label(&response), "grok/grok-3-mini");
        assert_eq!(label(&CanonicalResponse::default()), "llmux");
    }
}
