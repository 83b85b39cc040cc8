use isaac_assistant::{format_inputs_for_display, join_inputs};
use proptest::prelude::*;

proptest! {
    #[test]
    fn join_matches_successive_concatenation(fields in prop::collection::vec(".{0,12}", 0..8)) {
        let mut expected = String::new();
        for (idx, field) in fields.iter().enumerate() {
            if idx > 0 {
                expected.push_str("; ");
            }
            expected.push_str(field);
        }
        prop_assert_eq!(join_inputs(&fields), expected);
    }

    #[test]
    fn display_has_one_segment_per_field(values in prop::collection::vec("[a-z0-9 ]{0,10}", 1..7)) {
        let names: Vec<String> = (0..values.len()).map(|i| format!("F{i}")).collect();
        let display = format_inputs_for_display(&values, &names).unwrap();
        for (name, value) in names.iter().zip(&values) {
            let segment = format!("{name}: {value}");
            prop_assert!(display.contains(&segment));
        }
        prop_assert!(display.starts_with("F0: "));
    }
}
