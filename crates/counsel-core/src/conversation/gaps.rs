//! Information gaps: questions raised but not yet answered
//!
//! Resolution is a keyword heuristic. A gap resolves when an answering role's
//! message contains one of the keywords pulled from the question. It can miss
//! paraphrased answers and can fire on incidental mentions.

use super::roles::Role;
use super::Message;
use crate::length::is_cjk;
use crate::quality::evaluation::split_sentences;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

lazy_static! {
    static ref STOPWORDS: HashSet<&'static str> = [
        "about", "after", "also", "been", "being", "could", "does", "doing", "from", "have",
        "having", "into", "more", "most", "much", "other", "should", "some", "such", "tell",
        "than", "that", "their", "them", "then", "there", "these", "they", "this", "those",
        "through", "what", "when", "where", "which", "while", "with", "would", "your", "yours",
        "describe", "explain", "share", "please", "think", "feel", "kind", "like", "make",
        "many", "very", "will", "just", "does", "each", "ever", "student", "child", "family",
    ]
    .into_iter()
    .collect();

    static ref CJK_STOP_BIGRAMS: HashSet<&'static str> = [
        "什么", "怎么", "如何", "是否", "哪些", "为什么", "请问", "一下", "你们", "我们", "他们",
        "孩子", "您的", "你的", "有没", "没有", "可以", "能否", "觉得", "认为", "一些", "方面",
    ]
    .into_iter()
    .collect();

    /// Related terms, so a question about one resolves on any of them
    static ref TOPIC_GROUPS: Vec<Vec<&'static str>> = vec![
        vec!["学术", "学习", "成绩", "课程", "数学", "科学", "英语", "academic", "grades", "math", "science", "english", "courses"],
        vec!["领导", "组织", "管理", "团队", "项目", "leadership", "team", "organize", "project"],
        vec!["家庭", "父母", "教育理念", "支持", "parents", "values", "support", "home"],
        vec!["兴趣", "爱好", "编程", "音乐", "运动", "interests", "hobby", "hobbies", "music", "sports", "coding"],
        vec!["性格", "内向", "外向", "自信", "沟通", "personality", "confident", "introverted", "outgoing"],
        vec!["未来", "规划", "目标", "期望", "梦想", "future", "goals", "plans", "dream", "career"],
    ];
}

/// A question waiting for an answer from the family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InformationGap {
    pub topic: String,
    /// Lowercased terms, any of which resolves the gap
    pub keywords: Vec<String>,
    /// Roles expected to answer
    pub required_by: BTreeSet<Role>,
    pub raised_by: Role,
    pub raised_round: u32,
    pub resolved: bool,
    pub resolved_round: Option<u32>,
}

impl InformationGap {
    pub fn new(topic: impl Into<String>, raised_by: Role, raised_round: u32) -> Self {
        let topic = topic.into();
        Self {
            keywords: topic_keywords(&topic),
            topic,
            required_by: [Role::Parent, Role::Student].into_iter().collect(),
            raised_by,
            raised_round,
            resolved: false,
            resolved_round: None,
        }
    }

    /// Case-insensitive keyword overlap. A question with no usable keywords
    /// is addressed by any answer.
    pub fn addressed_by(&self, text: &str) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let text = text.to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }

    /// Whether a message in `round` falls in the same or the next round
    pub fn in_window(&self, round: u32) -> bool {
        round >= self.raised_round && round <= self.raised_round + 1
    }

    /// Full rounds elapsed since the gap was raised, counting the raising round
    pub fn age(&self, completed_rounds: u32) -> u32 {
        completed_rounds.saturating_sub(self.raised_round)
    }
}

/// Up to `max` questions from a turn, in order. Falls back to the first
/// sentence when nothing ends in a question mark.
pub fn extract_questions(text: &str, max: usize) -> Vec<String> {
    let mut questions = Vec::new();
    let mut first_sentence = None;

    for line in text.lines() {
        for span in split_sentences(line) {
            let sentence = format!("{}{}", span.body, span.terminator);
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }
            if first_sentence.is_none() {
                first_sentence = Some(sentence.to_string());
            }
            if span.terminator.contains(['?', '？']) && questions.len() < max {
                questions.push(sentence.to_string());
            }
        }
    }

    if questions.is_empty() {
        questions.extend(first_sentence);
    }
    questions
}

/// Keywords for a question: Latin words of four letters or more, CJK bigrams,
/// and the related terms of any topic group they touch
pub fn topic_keywords(question: &str) -> Vec<String> {
    let lowered = question.to_lowercase();
    let mut keywords: Vec<String> = Vec::new();

    let mut latin = String::new();
    let mut cjk: Vec<char> = Vec::new();
    for c in lowered.chars().chain(std::iter::once(' ')) {
        if is_cjk(c) {
            flush_latin(&mut latin, &mut keywords);
            cjk.push(c);
        } else if c.is_alphanumeric() {
            flush_cjk(&mut cjk, &mut keywords);
            latin.push(c);
        } else {
            flush_latin(&mut latin, &mut keywords);
            flush_cjk(&mut cjk, &mut keywords);
        }
    }

    for group in TOPIC_GROUPS.iter() {
        if group.iter().any(|term| lowered.contains(term)) {
            for term in group {
                push_unique(&mut keywords, term.to_string());
            }
        }
    }
    keywords
}

fn push_unique(keywords: &mut Vec<String>, keyword: String) {
    if !keywords.contains(&keyword) {
        keywords.push(keyword);
    }
}

fn flush_latin(word: &mut String, keywords: &mut Vec<String>) {
    if word.chars().count() >= 4
        && !STOPWORDS.contains(word.as_str())
        && !word.chars().all(|c| c.is_ascii_digit())
    {
        push_unique(keywords, word.clone());
    }
    word.clear();
}

fn flush_cjk(run: &mut Vec<char>, keywords: &mut Vec<String>) {
    for pair in run.windows(2) {
        let bigram: String = pair.iter().collect();
        if !CJK_STOP_BIGRAMS.contains(bigram.as_str()) {
            push_unique(keywords, bigram);
        }
    }
    run.clear();
}

/// Resolve open gaps addressed by an answering role's message.
///
/// With `within_window`, only gaps raised in the message's round or the one
/// before are eligible. Returns how many gaps were resolved.
pub fn resolve_gaps(gaps: &mut [InformationGap], message: &Message, within_window: bool) -> usize {
    if !message.role.behavior().answers_gaps {
        return 0;
    }

    let mut resolved = 0;
    for gap in gaps.iter_mut().filter(|g| !g.resolved) {
        if !gap.required_by.contains(&message.role) {
            continue;
        }
        if within_window && !gap.in_window(message.round) {
            continue;
        }
        if gap.addressed_by(&message.content) {
            gap.resolved = true;
            gap.resolved_round = Some(message.round);
            resolved += 1;
        }
    }
    resolved
}
