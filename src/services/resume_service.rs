use reqwest::Client;
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};
use crate::models::candidate::ParsedResume;

/// Resumes shorter than this carry no usable signal.
pub const MIN_RESUME_CHARS: usize = 50;
const MAX_RESUME_BYTES: u64 = 10 * 1024 * 1024;

const SKILL_VOCABULARY: &[&str] = &[
    "Python", "Rust", "Go", "Java", "JavaScript", "TypeScript", "Kotlin", "Swift", "C++", "C#",
    "Ruby", "PHP", "Scala", "SQL", "PostgreSQL", "MySQL", "MongoDB", "Redis", "Elasticsearch",
    "Docker", "Kubernetes", "Terraform", "AWS", "GCP", "Azure", "Linux", "Git", "CI/CD",
    "React", "Vue", "Angular", "Node.js", "Django", "FastAPI", "Flask", "Spring", "Rails",
    "GraphQL", "REST", "gRPC", "Kafka", "RabbitMQ", "Celery", "Airflow", "Spark", "Pandas",
    "NumPy", "PyTorch", "TensorFlow", "Machine Learning", "HTML", "CSS", "Figma",
];

const EDUCATION_MARKERS: &[&str] = &[
    "bachelor", "master", "phd", "ph.d", "b.sc", "m.sc", "bsc", "msc", "mba", "degree",
    "university", "college", "institute",
];

const EXPERIENCE_MARKERS: &[&str] = &[
    "experience", "engineer", "developer", "manager", "intern", "lead", "consultant",
    "present", "worked",
];

/// Extracts skills, experience and education lines from resume text, fetching it first
/// when only a URL is known.
#[derive(Clone)]
pub struct ResumeParser {
    client: Client,
    timeout: Duration,
}

impl ResumeParser {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn parse_text(&self, text: &str) -> ParsedResume {
        parse_resume_text(text)
    }

    pub async fn parse_url(&self, url: &str) -> Result<ParsedResume> {
        let text = self.fetch(url).await?;
        Ok(parse_resume_text(&text))
    }

    pub async fn fetch(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::InvalidInput(format!("invalid resume url: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(Error::InvalidInput(format!("unsupported resume url: {}", url)));
        }

        let resp = tokio::time::timeout(self.timeout, self.client.get(parsed).send())
            .await
            .map_err(|_| Error::UpstreamUnavailable("resume download timed out".to_string()))?
            .map_err(|e| Error::UpstreamUnavailable(format!("resume download failed: {}", e)))?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(Error::UpstreamUnavailable(format!(
                "resume host returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(Error::InvalidInput(format!("resume host returned {}", status)));
        }
        if resp.content_length().is_some_and(|len| len > MAX_RESUME_BYTES) {
            return Err(Error::InvalidInput("resume exceeds 10MB".to_string()));
        }

        let bytes = tokio::time::timeout(self.timeout, resp.bytes())
            .await
            .map_err(|_| Error::UpstreamUnavailable("resume download timed out".to_string()))?
            .map_err(|e| Error::UpstreamUnavailable(format!("resume download failed: {}", e)))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

pub fn parse_resume_text(text: &str) -> ParsedResume {
    if text.trim().chars().count() < MIN_RESUME_CHARS {
        return ParsedResume {
            text: text.to_string(),
            ..ParsedResume::default()
        };
    }

    let lower = text.to_lowercase();
    let skills = SKILL_VOCABULARY
        .iter()
        .filter(|skill| contains_term(&lower, &skill.to_lowercase()))
        .map(|skill| skill.to_string())
        .collect();

    let mut experience = Vec::new();
    let mut education = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let line_lower = line.to_lowercase();
        if EDUCATION_MARKERS.iter().any(|m| contains_term(&line_lower, m)) {
            education.push(line.to_string());
        } else if EXPERIENCE_MARKERS.iter().any(|m| contains_term(&line_lower, m))
            || has_year_range(line)
        {
            experience.push(line.to_string());
        }
    }

    ParsedResume {
        text: text.to_string(),
        skills,
        experience,
        education,
    }
}

/// Whole-word match: the characters around the hit must not be alphanumeric.
fn contains_term(haystack: &str, term: &str) -> bool {
    haystack.match_indices(term).any(|(idx, _)| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + term.len()..].chars().next();
        !before.is_some_and(|c| c.is_alphanumeric()) && !after.is_some_and(|c| c.is_alphanumeric())
    })
}

fn has_year_range(line: &str) -> bool {
    let years = line
        .split(|c: char| !c.is_ascii_digit())
        .filter(|chunk| chunk.len() == 4 && (chunk.starts_with("19") || chunk.starts_with("20")))
        .count();
    years >= 2
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESUME: &str = "Jane Doe\n\
        Senior Backend Engineer, Acme 2019 - 2024\n\
        Built services in Rust and Python on PostgreSQL, deployed with Docker.\n\
        B.Sc. Computer Science, State University\n";

    #[test]
    fn short_text_yields_no_skills() {
        let parsed = parse_resume_text("Rust developer");
        assert!(parsed.skills.is_empty());
        assert_eq!(parsed.text, "Rust developer");
    }

    #[test]
    fn extracts_vocabulary_skills_as_whole_words() {
        let parsed = parse_resume_text(RESUME);
        assert!(parsed.skills.contains(&"Rust".to_string()));
        assert!(parsed.skills.contains(&"Python".to_string()));
        assert!(parsed.skills.contains(&"PostgreSQL".to_string()));
        assert!(parsed.skills.contains(&"Docker".to_string()));
        assert!(!parsed.skills.contains(&"SQL".to_string()));
        assert!(!parsed.skills.contains(&"Go".to_string()));
    }

    #[test]
    fn splits_experience_and_education_lines() {
        let parsed = parse_resume_text(RESUME);
        assert_eq!(parsed.education, vec!["B.Sc. Computer Science, State University"]);
        assert!(parsed.experience[0].starts_with("Senior Backend Engineer"));
    }

    #[test]
    fn symbols_inside_terms_match() {
        assert!(contains_term("c++ and node.js", "c++"));
        assert!(contains_term("c++ and node.js", "node.js"));
        assert!(!contains_term("javascript", "java"));
    }
}
