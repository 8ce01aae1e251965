use std::collections::BTreeMap;

use crate::completions::ToolCallDelta;

/// A tool call reassembled from streamed fragments
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatedToolCall {
    pub id: Option<String>,
    pub name: String,
    pub arguments: String,
}

/// Collects tool-call fragments of one completion pass, keyed by call index
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<usize, AccumulatedToolCall>,
}

impl ToolCallAccumulator {
    pub fn push(&mut self, delta: ToolCallDelta) {
        let entry = self
            .calls
            .entry(delta.index)
            .or_insert_with(|| AccumulatedToolCall {
                id: None,
                name: String::new(),
                arguments: String::new(),
            });

        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            entry.id.get_or_insert(id);
        }
        if let Some(name) = delta.name.filter(|n| !n.is_empty()) {
            if entry.name.is_empty() {
                entry.name = name;
            }
        }
        if let Some(arguments) = delta.arguments {
            entry.arguments.push_str(&arguments);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Lowest-index call that received a name
    pub fn first_complete(&self) -> Option<&AccumulatedToolCall> {
        self.calls.values().find(|call| !call.name.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(index: usize, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            arguments: args.map(str::to_string),
        }
    }

    #[test]
    fn test_fragments_concatenate_per_index() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(delta(0, Some("call_a"), Some("web_search"), Some(r#"{"que"#)));
        acc.push(delta(0, None, None, Some(r#"ry":"rust"}"#)));

        let call = acc.first_complete().unwrap();
        assert_eq!(call.id.as_deref(), Some("call_a"));
        assert_eq!(call.name, "web_search");
        assert_eq!(call.arguments, r#"{"query":"rust"}"#);
    }

    #[test]
    fn test_first_complete_prefers_lowest_index() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(delta(1, Some("call_b"), Some("second"), Some("{}")));
        acc.push(delta(0, Some("call_a"), Some("first"), Some("{}")));

        assert_eq!(acc.first_complete().unwrap().name, "first");
    }

    #[test]
    fn test_nameless_fragments_are_not_complete() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(delta(0, None, None, Some("{}")));

        assert!(!acc.is_empty());
        assert!(acc.first_complete().is_none());
    }
}
