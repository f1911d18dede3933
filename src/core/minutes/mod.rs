pub mod parse;

use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::core::config::AppConfig;
use crate::core::llm::providers::openai::OpenAiProvider;
use crate::core::llm::{ChatMessage, GenerationOptions, LlmProvider};

pub use parse::parse_minutes;

pub const NOT_CONFIGURED: &str =
    "Either OPENAI_API_KEY or AZURE_OPENAI_ENDPOINT + AZURE_OPENAI_API_KEY must be set";

const OPTIONS: GenerationOptions = GenerationOptions {
    temperature: 0.3,
    max_tokens: 2000,
};

pub const SYSTEM_PROMPT: &str = r#"You are a professional consulting assistant. Generate comprehensive Meeting Minutes of Meeting (MOM) from the provided meeting notes or transcript.

You MUST format the output EXACTLY as follows in Markdown:

# Meeting Minutes

## Date and Time
[Extract and insert date and time from the meeting notes. If not available, use "TBD"]

## Location
[Extract location if mentioned, otherwise use "Virtual" or "TBD"]

## Meeting Title
[Extract or create a descriptive meeting title]

## Attendees
(Random order, titles omitted)
[List all attendees mentioned in the notes. Format as bullet points with names only, no titles]

## Materials Used
[List any materials, documents, presentations, or tools mentioned during the meeting]

## Overview
[Summarize the transcript into one concise abstract paragraph that keeps the most important points, so a reader understands the main points of the discussion without reading the whole text. Leave out tangents and unnecessary detail. Limit the paragraph to 80 words.]

## Discussion Items
[List the key discussion items for each speaker in this format:

**[Speaker 1 Name]:**
- [Point 1 discussed by Speaker 1]
- [Point 2 discussed by Speaker 1]

**[Speaker 2 Name]:**
- [Point 1 discussed by Speaker 2]
- [Point 2 discussed by Speaker 2]

Identify every speaker in the transcript and add as many speakers and points as needed.]

## Action Items
[Identify every task, assignment or action agreed upon or mentioned as needing to be done, whether assigned to a person or to the group. Present them as a Markdown table with exactly three columns:
1. **Action Item** - The task or action to be completed
2. **Assignee Name** - The person assigned to complete the task
3. **Due Date** - The due date in format: MM/DD & Day (e.g., "01/15 & Monday")

| Action Item | Assignee Name | Due Date |
|------------|---------------|----------|
| [Task description] | [Assignee name] | [MM/DD & Day] |

If no action items are found, use a single row stating "No action items identified."]

## Decisions
[Table or list of all decisions made during the meeting, each with the decision, its owner and any date or deadline]

## Detailed Minutes

### Project Progress Report
[Summarize project status, milestones, and progress updates mentioned]

### Confirmation of Issues/To Do Status
[Document any issues discussed and status of previous action items]

### Other Contact Items
[Any other important discussion points, concerns, or items that need attention]

## Next Meeting
- **Date and Time:** [Extract next meeting date/time if mentioned, otherwise "TBD"]
- **Location:** [Extract location if mentioned, otherwise "TBD"]
- **Attendees:** [List expected attendees for next meeting]

Use professional consulting language. Extract all relevant information from the meeting notes and attribute every contribution to the right speaker."#;

pub fn user_prompt(meeting_notes: &str) -> String {
    format!(
        "Generate Meeting Minutes from the following transcript:\n\n{}",
        meeting_notes
    )
}

/// Turns raw meeting notes into Markdown minutes.
#[async_trait]
pub trait MinutesWriter: Send + Sync {
    async fn generate_minutes(&self, meeting_notes: &str) -> Result<String>;
}

pub struct MinutesGenerator {
    provider: Option<Box<dyn LlmProvider>>,
}

impl MinutesGenerator {
    pub fn new(provider: Box<dyn LlmProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// Azure OpenAI wins when both its endpoint and key are set, then OpenAI.
    /// With neither, the generator is built but every call fails.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.http_timeout_secs);
        let azure = &config.azure_openai;
        let provider: Option<Box<dyn LlmProvider>> =
            match (&azure.endpoint, &azure.api_key, &config.openai.api_key) {
                (Some(endpoint), Some(key), _) => Some(Box::new(OpenAiProvider::azure(
                    endpoint.clone(),
                    key.clone(),
                    azure.deployment.clone(),
                    timeout,
                )?)),
                (_, _, Some(key)) => Some(Box::new(OpenAiProvider::openai(
                    key.clone(),
                    config.openai.model.clone(),
                    config.openai.base_url.clone(),
                    timeout,
                )?)),
                _ => None,
            };

        match &provider {
            Some(p) => info!("Minutes generator using {:?}", p.provider_type()),
            None => warn!("No text generation provider configured; minutes generation is disabled"),
        }
        Ok(Self { provider })
    }
}

#[async_trait]
impl MinutesWriter for MinutesGenerator {
    async fn generate_minutes(&self, meeting_notes: &str) -> Result<String> {
        let provider = self.provider.as_ref().ok_or_else(|| anyhow!(NOT_CONFIGURED))?;
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(user_prompt(meeting_notes)),
        ];
        let content = provider.generate(&messages, OPTIONS).await?;
        if content.trim().is_empty() {
            return Err(anyhow!("No content generated from AI"));
        }
        info!("Generated minutes ({} chars)", content.len());
        Ok(content)
    }
}
