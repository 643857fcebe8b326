use std::collections::BTreeMap;

use columbus_core::backend::Prompt;
use columbus_core::platform::Platform;
use columbus_core::scan::{PlatformState, WorkItem};

/// One queue per destination holding every (prompt, sample) pair in prompt
/// order. Sample numbers start at 1.
pub fn build_work_queues(
    prompts: &[Prompt],
    platforms: &[Platform],
    samples_per_prompt: u32,
) -> BTreeMap<Platform, PlatformState> {
    platforms
        .iter()
        .map(|&platform| {
            let queue = prompts
                .iter()
                .flat_map(|prompt| {
                    (1..=samples_per_prompt)
                        .map(move |sample| WorkItem::new(platform, prompt.id.clone(), prompt.text.clone(), sample))
                })
                .collect();
            (platform, PlatformState::new(queue))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use columbus_core::ids::PromptId;
    use columbus_core::scan::{ItemStatus, PlatformStatus};

    fn prompts(n: usize) -> Vec<Prompt> {
        (1..=n)
            .map(|i| Prompt {
                id: PromptId::from_raw(format!("p{i}")),
                text: format!("question {i}"),
                category: None,
            })
            .collect()
    }

    #[test]
    fn item_count_is_prompts_times_destinations_times_samples() {
        let queues = build_work_queues(&prompts(3), &[Platform::Claude, Platform::Gemini], 2);
        let total: usize = queues.values().map(|s| s.queue.len()).sum();
        assert_eq!(total, 3 * 2 * 2);
        for state in queues.values() {
            assert_eq!(state.status, PlatformStatus::Pending);
            assert!(state.queue.iter().all(|i| i.status == ItemStatus::Pending));
        }
    }

    #[test]
    fn items_follow_prompt_then_sample_order() {
        let queues = build_work_queues(&prompts(2), &[Platform::Perplexity], 2);
        let ids: Vec<&str> = queues[&Platform::Perplexity]
            .queue
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec![
                "perplexity:p1:1",
                "perplexity:p1:2",
                "perplexity:p2:1",
                "perplexity:p2:2"
            ]
        );
    }

    #[test]
    fn destinations_iterate_in_fixed_order() {
        let queues = build_work_queues(&prompts(1), &[Platform::Perplexity, Platform::ChatGpt], 1);
        let order: Vec<Platform> = queues.keys().copied().collect();
        assert_eq!(order, vec![Platform::ChatGpt, Platform::Perplexity]);
    }

    #[test]
    fn no_prompts_gives_empty_queues() {
        let queues = build_work_queues(&[], &[Platform::Claude], 3);
        assert!(queues[&Platform::Claude].queue.is_empty());
    }
}
