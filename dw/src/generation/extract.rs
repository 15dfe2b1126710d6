//! Fenced code block extraction

const FENCE: &str = "```";

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with(FENCE)
}

/// Pull the candidate out of a model response
///
/// Returns the lines strictly between the first fence line and the next one;
/// the opening line (and its language tag) is discarded. An unterminated
/// fence yields everything after the opening line. Without any fence the
/// response is returned unchanged.
pub fn extract_artifact(response: &str) -> String {
    let mut lines = response.lines();
    if lines.by_ref().find(|l| is_fence(l)).is_none() {
        return response.to_string();
    }

    let body: Vec<&str> = lines.take_while(|l| !is_fence(l)).collect();
    let mut artifact = body.join("\n");
    if !artifact.is_empty() {
        artifact.push('\n');
    }
    artifact
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fenced_block_with_prose() {
        let response = "Here is the Dockerfile:\n\n```dockerfile\nFROM python:3.12-slim\nCOPY reverse.py /app/\nCMD [\"python\", \"/app/reverse.py\"]\n```\n\nThis image runs the script.";
        assert_eq!(
            extract_artifact(response),
            "FROM python:3.12-slim\nCOPY reverse.py /app/\nCMD [\"python\", \"/app/reverse.py\"]\n"
        );
    }

    #[test]
    fn test_only_first_block_is_used() {
        let response = "```\nFROM alpine\n```\nor\n```\nFROM debian\n```";
        assert_eq!(extract_artifact(response), "FROM alpine\n");
    }

    #[test]
    fn test_no_fence_returns_raw_text() {
        let response = "FROM node:20\nCMD [\"node\", \"app.js\"]";
        assert_eq!(extract_artifact(response), response);
    }

    #[test]
    fn test_unterminated_fence_takes_rest() {
        assert_eq!(extract_artifact("```Dockerfile\nFROM alpine\nRUN true"), "FROM alpine\nRUN true\n");
    }

    #[test]
    fn test_indented_fence_is_recognized() {
        assert_eq!(extract_artifact("  ```\nFROM alpine\n  ```"), "FROM alpine\n");
    }

    #[test]
    fn test_empty_block_is_empty() {
        assert_eq!(extract_artifact("```\n```"), "");
    }

    #[test]
    fn test_body_indentation_preserved() {
        assert_eq!(
            extract_artifact("```\nRUN apt-get update && \\\n    apt-get install -y curl\n```"),
            "RUN apt-get update && \\\n    apt-get install -y curl\n"
        );
    }

    proptest! {
        #[test]
        fn prop_prose_around_fence_is_discarded(
            before in "[A-Za-z .,:]{0,40}",
            body in proptest::collection::vec("[A-Z][A-Za-z0-9 /._-]{0,30}", 1..6),
            after in "[A-Za-z .,:]{0,40}",
        ) {
            let artifact = format!("{}\n", body.join("\n"));
            let response = format!("{}\n```dockerfile\n{}```\n{}", before, artifact, after);
            prop_assert_eq!(extract_artifact(&response), artifact);
        }

        #[test]
        fn prop_unfenced_text_is_unchanged(text in "[A-Za-z0-9 \n]{0,80}") {
            prop_assert_eq!(extract_artifact(&text), text);
        }
    }
}
