/// Pull candidate source out of a model response
const PYTHON_FENCE: &str = "```python";
const FENCE: &str = "```";

/// Body of the first closed ```python block, else the whole response; trimmed either way
pub fn extract_code(response: &str) -> String {
    if let Some(start) = response.find(PYTHON_FENCE) {
        let body_start = start + PYTHON_FENCE.len();
        if let Some(len) = response[body_start..].find(FENCE) {
            if len > 0 {
                return response[body_start..body_start + len].trim().to_string();
            }
        }
    }
    response.trim().to_string()
}
