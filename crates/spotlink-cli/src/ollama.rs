//! Probe of the local Ollama server before the agent starts.
//!
//! Blocking on purpose: it runs before the async runtime is built.

use std::time::Duration;

use serde::Deserialize;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// A single model entry returned by Ollama's `/api/tags` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaModel {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<OllamaModel>,
}

/// List the models downloaded into the Ollama server at `base_url`.
pub fn fetch_models(base_url: &str) -> Result<Vec<OllamaModel>, String> {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    let client = reqwest::blocking::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .map_err(|e| format!("HTTP client error: {e}"))?;
    let response = client
        .get(&url)
        .send()
        .map_err(|e| format!("Ollama unreachable at {url}: {e}"))?;

    if !response.status().is_success() {
        return Err(format!("Ollama returned HTTP {}", response.status()));
    }

    let tags: TagsResponse = response
        .json()
        .map_err(|e| format!("Failed to parse Ollama response: {e}"))?;
    Ok(tags.models)
}

/// `true` if `wanted` is among `models`; an untagged name matches `:latest`.
pub fn has_model(models: &[OllamaModel], wanted: &str) -> bool {
    models.iter().any(|m| {
        m.name == wanted || m.name.strip_suffix(":latest").is_some_and(|base| base == wanted)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models(names: &[&str]) -> Vec<OllamaModel> {
        names
            .iter()
            .map(|n| OllamaModel { name: n.to_string() })
            .collect()
    }

    #[test]
    fn tags_response_parses() {
        let tags: TagsResponse = serde_json::from_str(
            r#"{"models":[{"name":"qwen3-vl:4b","size":1},{"name":"llava:latest"}]}"#,
        )
        .unwrap();
        assert_eq!(tags.models.len(), 2);
        assert_eq!(tags.models[0].name, "qwen3-vl:4b");
    }

    #[test]
    fn model_lookup_handles_latest_tag() {
        let available = models(&["qwen3-vl:4b", "llava:latest"]);
        assert!(has_model(&available, "qwen3-vl:4b"));
        assert!(has_model(&available, "llava"));
        assert!(!has_model(&available, "qwen3-vl"));
    }

    #[test]
    fn unreachable_server_is_an_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        assert!(fetch_models(&format!("http://{addr}")).is_err());
    }
}
