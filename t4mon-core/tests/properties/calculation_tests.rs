//! Property tests for calculation expressions

use proptest::prelude::*;
use t4mon_core::Calculations;
use t4mon_core::calculations::{BinaryOp, parse_expression};
use t4mon_core::dataset::{Column, Dataset, Metadata};

fn dataset(a: &[f64], b: &[f64]) -> Dataset {
    let start = chrono::NaiveDate::from_ymd_opt(2015, 6, 5)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid date");
    let index = (0..a.len())
        .map(|i| start + chrono::Duration::minutes(i as i64))
        .collect();
    Dataset::new(
        index,
        vec![
            Column::numeric("A", a.iter().copied().map(Some).collect()),
            Column::numeric("B", b.iter().copied().map(Some).collect()),
        ],
        Metadata::for_system("SYS1"),
    )
    .expect("consistent dataset")
}

proptest! {
    /// Property: The parser never panics, whatever the input
    #[test]
    fn parser_total(input in "\\PC{0,40}") {
        let _ = parse_expression(&input);
    }

    /// Property: Multiplication binds tighter than addition
    #[test]
    fn precedence_is_conventional(
        rows in prop::collection::vec((-1.0e6f64..1.0e6, -1.0e6f64..1.0e6), 1..20),
    ) {
        let (a, b): (Vec<f64>, Vec<f64>) = rows.into_iter().unzip();
        let mut data = dataset(&a, &b);
        let calc = Calculations::parse("R = A + B * 2 - (A - B) / 4").expect("valid definition");
        calc.apply(&mut data);

        let result = data.column("R").and_then(|c| c.values.as_numeric()).expect("numeric result");
        for (i, value) in result.iter().enumerate() {
            let expected = a[i] + b[i] * 2.0 - (a[i] - b[i]) / 4.0;
            let got = value.expect("finite operands give a value");
            prop_assert!((got - expected).abs() <= 1e-6 * expected.abs().max(1.0));
        }
    }

    /// Property: Division by zero and overflow yield missing values
    #[test]
    fn non_finite_results_are_missing(a in any::<f64>(), b in any::<f64>()) {
        match BinaryOp::Div.apply(a, b) {
            Some(v) => prop_assert!(v.is_finite() && b != 0.0),
            None => prop_assert!(b == 0.0 || !(a / b).is_finite()),
        }
        if let Some(v) = BinaryOp::Mul.apply(a, b) {
            prop_assert!(v.is_finite());
        }
    }

    /// Property: Unknown operands leave the whole result column empty
    #[test]
    fn unknown_operand_gives_empty_column(a in prop::collection::vec(-100.0f64..100.0, 1..10)) {
        let mut data = dataset(&a, &a);
        Calculations::parse("R = A + NOPE").expect("valid definition").apply(&mut data);
        let result = data.column("R").expect("column added");
        prop_assert!(result.values.is_all_missing());
        prop_assert_eq!(result.values.len(), a.len());
    }
}
