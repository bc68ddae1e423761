pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# SIA-EVENTS CONFIGURATION
# =============================================================================
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/sia-events/config.yml
#   3. /etc/sia-events/config.yml
#
# Any value may reference an environment variable with $env{NAME}. Loading
# fails if a referenced variable is not set.

# =============================================================================
# API
# =============================================================================
api:
  # Report API host, including scheme
  base_url: https://api.example.net

  # Account (configuration) ID the reports belong to
  account_id: "12345"

  # Headers sent with every request. Credentials belong here, e.g.
  #   Authorization: "Bearer $env{SIA_API_TOKEN}"
  headers:
    Accept: application/json

  # Optional HTTP/S proxy, host:port without scheme
  # proxy: 10.0.0.1:8888

  # Retries for 429/5xx and transport errors, with exponential backoff
  # starting at retry_interval and capped at 60s
  max_retries: 3
  retry_interval: 1s

  # Per-call timeout. Defaults to twice the poll interval, at most 5m
  # request_timeout: 2m

# =============================================================================
# FETCH
# =============================================================================
# Defaults for the event command; every value can be overridden on the
# command line.
fetch:
  # Records requested per page
  page_size: 5000

  # Concurrent page fetches (capped at 8)
  concurrency: 1

  # Poll frequency in --tail mode
  poll_interval: 60s

  # Safety margin subtracted from now, events younger than this are not
  # requested because they may not be indexed yet
  collection_delay: 3m

  # Width of the default ad-hoc window
  span_duration: 27m
"#
    .to_string()
}
