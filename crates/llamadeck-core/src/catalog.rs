use serde::Serialize;

pub const LIBRARY_URL: &str = "https://ollama.com/library";

/// A well-known downloadable model, compiled in so the setup screen needs no network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub display_name: &'static str,
    pub parameter_count: &'static str,
    pub size_on_disk: &'static str,
    pub pull_identifier: &'static str,
}

const fn entry(
    display_name: &'static str,
    parameter_count: &'static str,
    size_on_disk: &'static str,
    pull_identifier: &'static str,
) -> CatalogEntry {
    CatalogEntry {
        display_name,
        parameter_count,
        size_on_disk,
        pull_identifier,
    }
}

pub const CATALOG: &[CatalogEntry] = &[
    entry("Llama 3", "8B", "4.7GB", "llama3"),
    entry("Llama 3", "70B", "40GB", "llama3:70b"),
    entry("Phi 3 Mini", "3.8B", "2.3GB", "phi3"),
    entry("Phi 3 Medium", "14B", "7.9GB", "phi3:medium"),
    entry("Gemma 2", "9B", "5.5GB", "gemma2"),
    entry("Gemma 2", "27B", "16GB", "gemma2:27b"),
    entry("Mistral", "7B", "4.1GB", "mistral"),
    entry("Moondream 2", "1.4B", "829MB", "moondream"),
    entry("Neural Chat", "7B", "4.1GB", "neural-chat"),
    entry("Starling", "7B", "4.1GB", "starling-lm"),
    entry("Code Llama", "7B", "3.8GB", "codellama"),
    entry("Llama 2 Uncensored", "7B", "3.8GB", "llama2-uncensored"),
    entry("LLaVA", "7B", "4.5GB", "llava"),
    entry("Solar", "10.7B", "6.1GB", "solar"),
];

impl CatalogEntry {
    pub fn find_by_identifier(identifier: &str) -> Option<&'static CatalogEntry> {
        CATALOG.iter().find(|e| e.pull_identifier == identifier)
    }
}
