//! Prompt builders for every generation stage.
//!
//! Each document prompt names the exact metadata block the Validation Gate
//! expects, so a cooperative generator passes on the first try.

use std::fmt::Write as _;

use chrono::NaiveDate;

use presswork_gateway::SearchResult;
use presswork_shared::{ContentKind, Language, NewsItem};

use crate::pipeline::BacklogJob;
use crate::topic::Narrative;

const MAX_RESEARCH_EXCERPT_CHARS: usize = 6000;
const MAX_EXISTING_BODY_CHARS: usize = 3000;

fn language_line(language: Language) -> &'static str {
    match language {
        Language::En => "Output language: English. Do not mix in Chinese text.",
        Language::Zh => {
            "Output language: Simplified Chinese (zh). Technical terms may stay in English."
        }
    }
}

fn metadata_block(
    kind: ContentKind,
    language: Language,
    slug_base: &str,
    date: NaiveDate,
) -> String {
    let mut block = format!(
        "---\nslug: \"{slug_base}\"\ntitle: \"...\"\ndescription: \"...\"\ndate: \"{}\"\nlang: \"{}\"\n",
        date.format("%Y-%m-%d"),
        language.code()
    );
    if kind == ContentKind::Blog {
        block.push_str("keywords: [\"...\", \"...\"]\n");
    }
    block.push_str("---");
    block
}

fn kind_brief(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Glossary => {
            "a glossary entry: a one-sentence definition, then how it works, why it matters, \
             and related terms"
        }
        ContentKind::Compare => {
            "a comparison page: overview of both sides, a comparison table, strengths and \
             weaknesses, and when to choose which"
        }
        ContentKind::Faq => {
            "an FAQ answer: a direct answer in the first paragraph, then supporting detail and \
             practical examples"
        }
        ContentKind::Tier2 => "an in-depth article of 800 to 1500 words with practical examples",
        ContentKind::Tier3 => "a short explainer of 300 to 600 words",
        ContentKind::Blog => "a feature blog post",
    }
}

fn grounding_section(out: &mut String, grounding: &[SearchResult]) {
    if grounding.is_empty() {
        return;
    }
    out.push_str("\nSearch results for grounding (use them, do not copy them):\n");
    for result in grounding {
        let _ = writeln!(out, "- {} ({}): {}", result.title, result.url, result.snippet);
    }
}

/// Document prompt for one backlog item in one language.
pub fn backlog_document(job: &BacklogJob, language: Language, date: NaiveDate) -> String {
    let subject = match (language, &job.label_zh) {
        (Language::Zh, Some(zh)) => format!("{} ({zh})", job.label),
        _ => job.label.clone(),
    };

    let mut out = format!(
        "You are writing {} for a technical site read by AI developers and tech leads.\n\n\
         Subject: {subject}\n",
        kind_brief(job.kind)
    );
    if let Some(category) = &job.category {
        let _ = writeln!(out, "Category: {category}");
    }
    grounding_section(&mut out, &job.grounding);

    let _ = write!(
        out,
        "\n{}\n\nReturn a single Markdown document that starts with this metadata block, \
         filled in:\n\n{}\n\nNo code fences around the document, no commentary before or after it.\n",
        language_line(language),
        metadata_block(job.kind, language, &job.slug_base, date)
    );
    out
}

/// Research stage prompt.
pub fn research(topic: &str, date: NaiveDate) -> String {
    format!(
        "Research the following topic as of {date}. Collect what happened, who is involved, \
         how it works, why it matters, open risks, and primary sources with URLs.\n\n\
         Topic: {topic}\n\n\
         Return a structured research report in Markdown."
    )
}

/// Narrative stage prompt: distill research into the JSON narrative.
pub fn narrative(topic: &str, research_report: &str) -> String {
    let excerpt: String = research_report
        .chars()
        .take(MAX_RESEARCH_EXCERPT_CHARS)
        .collect();
    format!(
        "Turn this research into a core narrative for a bilingual article.\n\n\
         Topic: {topic}\n\nResearch report:\n{excerpt}\n\n\
         Return ONLY a JSON object with these fields:\n\
         {{\n  \"title\": string,\n  \"one_liner\": string,\n  \"key_points\": [3 to 5 strings],\n  \
         \"faq\": [{{\"question\": string, \"answer\": string}}],\n  \
         \"references\": [{{\"title\": string, \"url\": string, \"source\": string, \"date\": \"YYYY-MM-DD\"}}],\n  \
         \"seo\": {{\"slug\": kebab-case string, \"keywords_en\": [strings], \"keywords_zh\": [strings], \
         \"meta_description_en\": string}}\n}}"
    )
}

/// Write stage prompt for one language of a topic article.
pub fn topic_article(
    narrative: &Narrative,
    language: Language,
    slug_base: &str,
    date: NaiveDate,
) -> String {
    let mut out = format!(
        "Write a feature blog post from this narrative.\n\nTitle: {}\nOne-liner: {}\n\nKey points:\n",
        narrative.title, narrative.one_liner
    );
    for point in &narrative.key_points {
        let _ = writeln!(out, "- {point}");
    }
    if !narrative.faq.is_empty() {
        out.push_str("\nFAQ to answer at the end:\n");
        for entry in &narrative.faq {
            let _ = writeln!(out, "- Q: {}\n  A: {}", entry.question, entry.answer);
        }
    }
    let keywords = match language {
        Language::En => &narrative.seo.keywords_en,
        Language::Zh => &narrative.seo.keywords_zh,
    };
    if !keywords.is_empty() {
        let _ = writeln!(out, "\nUse these keywords in the metadata: {}", keywords.join(", "));
    }

    let _ = write!(
        out,
        "\n{}\n\nReturn a single Markdown document of at least 800 words that starts with this \
         metadata block, filled in:\n\n{}\n\nNo code fences around the document.\n",
        language_line(language),
        metadata_block(ContentKind::Blog, language, slug_base, date)
    );
    out
}

/// Keyword extraction prompt over the recent news window.
pub fn extract_keywords(news: &[NewsItem]) -> String {
    let mut out = String::from(
        "You are an SEO keyword strategist for a technical site about AI. From the news below, \
         extract search keywords worth a page of their own.\n\nNews:\n",
    );
    for item in news {
        let _ = write!(out, "- [{}] {}", item.id, item.title);
        if let Some(summary) = &item.summary {
            let _ = write!(out, ": {summary}");
        }
        out.push('\n');
    }
    out.push_str(
        "\nReturn ONLY a JSON array. Each element:\n\
         {\"keyword\": string, \"keyword_zh\": string, \
         \"type\": \"glossary\" | \"compare\" | \"faq\" | \"tier2\" | \"tier3\", \
         \"relevance\": 1-10, \"newness\": 1-10, \
         \"category\": \"models\" | \"tools\" | \"infra\" | \"research\" | \"business\" | \"other\", \
         \"news_ids\": [ids from the list above]}\n",
    );
    out
}

/// Update-section prompt for an existing document.
pub fn update_section(
    title: &str,
    existing_body: &str,
    news: &[NewsItem],
    language: Language,
    date: NaiveDate,
) -> String {
    let excerpt: String = existing_body.chars().take(MAX_EXISTING_BODY_CHARS).collect();
    let mut out = format!(
        "An article needs a short update about recent news ({date}).\n\n\
         Article title: {title}\n\nArticle excerpt:\n{excerpt}\n\nNew developments:\n"
    );
    for item in news {
        let _ = write!(out, "- {} ({})", item.title, item.url);
        if let Some(summary) = &item.summary {
            let _ = write!(out, ": {summary}");
        }
        out.push('\n');
    }
    let _ = write!(
        out,
        "\n{}\n\nReturn 1 to 3 paragraphs of Markdown explaining what changed and why it matters \
         for readers of this article. No heading, no metadata block.\n",
        language_line(language)
    );
    out
}
