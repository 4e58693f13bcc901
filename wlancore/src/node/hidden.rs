use serde::{Deserialize, Serialize};

/// Anonymous interference reports needed before a node is considered hidden.
pub const SUSPICIONS_TO_HIDE: u32 = 2;

/// Nodes whose transmissions destroyed frames of ours but which we cannot sense.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HiddenNodes {
    hidden: Vec<bool>,
    suspicion: Vec<u32>,
}

impl HiddenNodes {
    pub fn new(node_count: usize) -> Self {
        Self {
            hidden: vec![false; node_count],
            suspicion: vec![0; node_count],
        }
    }

    pub fn mark(&mut self, node_id: usize) {
        self.hidden[node_id] = true;
    }

    /// Adds one suspicion, returns true if this made `node_id` hidden.
    pub fn suspect(&mut self, node_id: usize) -> bool {
        self.suspicion[node_id] += 1;

        let newly = !self.hidden[node_id] && self.suspicion[node_id] >= SUSPICIONS_TO_HIDE;
        if newly {
            self.hidden[node_id] = true;
        }
        newly
    }

    pub fn is_hidden(&self, node_id: usize) -> bool {
        self.hidden[node_id]
    }

    pub fn list(&self) -> Vec<usize> {
        self.hidden
            .iter()
            .enumerate()
            .filter_map(|(n, x)| x.then_some(n))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_suspicions_hide() {
        let mut hidden = HiddenNodes::new(4);

        assert!(!hidden.suspect(2));
        assert!(!hidden.is_hidden(2));
        assert!(hidden.suspect(2));
        assert!(!hidden.suspect(2));

        hidden.mark(0);
        assert_eq!(hidden.list(), vec![0, 2]);
    }
}
