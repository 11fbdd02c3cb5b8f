//! Partial state transfer into the shared base

use super::StateDict;

/// Top-level modules that only exist in student tails
pub const STUDENT_ONLY_STAGES: [&str; 4] = ["layer2", "layer3", "layer4", "fc"];

/// True when `key` belongs to layer2, layer3, layer4 or the classifier
///
/// Only the first dotted segment is inspected, so `layer1.0.conv2.weight`
/// is a base key even though it contains `conv2`.
pub fn is_student_only_key(key: &str) -> bool {
    let head = key.split('.').next().unwrap_or(key);
    STUDENT_ONLY_STAGES.contains(&head)
}

/// Keep only the entries of a full checkpoint that belong to the base
pub fn base_state(state: &StateDict) -> StateDict {
    state
        .iter()
        .filter(|(key, _)| !is_student_only_key(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};
    use proptest::prelude::*;

    #[test]
    fn test_student_only_keys() {
        assert!(is_student_only_key("layer2.0.conv1.weight"));
        assert!(is_student_only_key("layer4.2.bn3.running_var"));
        assert!(is_student_only_key("fc.weight"));
        assert!(is_student_only_key("fc"));
        assert!(!is_student_only_key("conv1.weight"));
        assert!(!is_student_only_key("layer1.0.downsample.0.weight"));
        assert!(!is_student_only_key("layer20.weight"));
        assert!(!is_student_only_key("fcn.weight"));
    }

    #[test]
    fn test_base_state_drops_student_keys() {
        let mut state = StateDict::new();
        for key in ["conv1.weight", "bn1.bias", "layer1.0.conv1.weight", "layer3.0.conv1.weight", "fc.bias"] {
            state.insert(key.to_string(), ArrayD::zeros(IxDyn(&[1])));
        }
        let base = base_state(&state);
        let keys: Vec<&str> = base.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["bn1.bias", "conv1.weight", "layer1.0.conv1.weight"]);
    }

    fn arb_key() -> impl Strategy<Value = String> {
        (
            prop_oneof![
                Just("conv1"),
                Just("bn1"),
                Just("layer1"),
                Just("layer2"),
                Just("layer3"),
                Just("layer4"),
                Just("fc")
            ],
            prop::collection::vec("[a-z0-9_]{1,8}", 0..4),
        )
            .prop_map(|(head, rest)| {
                std::iter::once(head.to_string())
                    .chain(rest)
                    .collect::<Vec<_>>()
                    .join(".")
            })
    }

    proptest! {
        #[test]
        fn prop_base_state_never_contains_student_keys(
            keys in prop::collection::btree_set(arb_key(), 0..32)
        ) {
            let state: StateDict = keys
                .iter()
                .map(|k| (k.clone(), ArrayD::zeros(IxDyn(&[2]))))
                .collect();
            let base = base_state(&state);
            for key in base.keys() {
                let head = key.split('.').next().unwrap();
                prop_assert!(!STUDENT_ONLY_STAGES.contains(&head));
            }
            let kept = state.keys().filter(|k| !is_student_only_key(k)).count();
            prop_assert_eq!(base.len(), kept);
        }
    }
}
