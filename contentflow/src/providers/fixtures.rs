//! Deterministic search results used when no search provider answers.

use super::SearchResult;

const SOURCES: [&str; 10] = [
    "https://example.com",
    "https://techcrunch.com",
    "https://medium.com",
    "https://wikipedia.org",
    "https://forbes.com",
    "https://hbr.org",
    "https://techradar.com",
    "https://zdnet.com",
    "https://theverge.com",
    "https://arstechnica.com",
];

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builds up to ten plausible results for `topic`.
///
/// The output depends only on the arguments, so repeated runs over the
/// same job produce identical step payloads.
#[must_use]
pub fn fixture_search_results(topic: &str, limit: usize) -> Vec<SearchResult> {
    let title = title_case(topic);
    let slug = topic.trim().to_lowercase().replace(' ', "-");
    let titles = [
        format!("Complete Guide to {title}"),
        format!("Best {title} in 2026"),
        format!("Everything You Need to Know About {title}"),
        format!("{title}: A Comprehensive Overview"),
        format!("Top 10 {title} Solutions"),
        format!("How to Choose the Right {title}"),
        format!("{title} Explained for Busy Teams"),
        format!("The Ultimate {title} Handbook"),
        format!("{title}: Tips, Tricks, and Best Practices"),
        format!("Understanding {title}: A Deep Dive"),
    ];
    let snippets = [
        format!("Discover the most effective {topic} approaches. This guide covers everything from basics to advanced techniques."),
        format!("Looking for the best {topic}? We reviewed dozens of options to help you make an informed decision."),
        format!("Learn everything about {topic} with a detailed guide, including common pitfalls and actionable advice."),
        format!("This resource covers all aspects of {topic}, from fundamental concepts to day-to-day use."),
        format!("Explore the top-rated {topic} options available today. Compare features, pricing, and user reviews."),
        format!("Master {topic} with a step-by-step guide for beginners and experienced users alike."),
        format!("A practical look at {topic}: what works, what does not, and how teams measure results."),
        format!("Your complete resource for {topic}, with tutorials, comparisons, and recommendations."),
        format!("Everything you need to know about {topic} in one place, updated with the latest information."),
        format!("Navigate {topic} with confidence through clear explanations and practical examples."),
    ];

    (0..limit.min(SOURCES.len()))
        .map(|i| SearchResult {
            rank: u32::try_from(i + 1).unwrap_or(u32::MAX),
            url: format!("{}/{slug}", SOURCES[i]),
            title: titles[i].clone(),
            snippet: snippets[i].clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_results_are_deterministic() {
        let a = fixture_search_results("remote work tools", 10);
        let b = fixture_search_results("remote work tools", 10);
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
        assert_eq!(a[0].rank, 1);
        assert_eq!(a[0].url, "https://example.com/remote-work-tools");
        assert_eq!(a[0].title, "Complete Guide to Remote Work Tools");
    }

    #[test]
    fn test_fixture_results_respect_limit() {
        assert_eq!(fixture_search_results("x", 3).len(), 3);
        assert_eq!(fixture_search_results("x", 50).len(), 10);
    }
}
