//! Property tests for the featurizer and predictor on arbitrary input

use proptest::prelude::*;
use spamguard_classifiers::prelude::*;
use spamguard_classifiers::{Featurizer, FittedFeaturizer};
use spamguard_core::LabeledExample;
use std::sync::OnceLock;

fn featurizer() -> &'static FittedFeaturizer {
    static FITTED: OnceLock<FittedFeaturizer> = OnceLock::new();
    FITTED.get_or_init(|| {
        Featurizer::default()
            .fit(&[
                "WIN FREE MONEY NOW",
                "meeting at 5pm tomorrow",
                "claim your prize",
                "project status update",
            ])
            .unwrap()
    })
}

fn predictor() -> &'static Predictor {
    static PREDICTOR: OnceLock<Predictor> = OnceLock::new();
    PREDICTOR.get_or_init(|| {
        let dataset = Dataset::from_examples(vec![
            LabeledExample::spam("WIN FREE MONEY NOW"),
            LabeledExample::ham("meeting at 5pm tomorrow"),
        ]);
        Predictor::from_model(Trainer::default().fit(&dataset).unwrap())
    })
}

proptest! {
    #[test]
    fn transform_has_fixed_dimension(text in any::<String>()) {
        let vector = featurizer().transform(&text);
        prop_assert_eq!(vector.len(), featurizer().dimension());
        prop_assert!(vector.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn transform_is_stable(text in "\\PC{0,64}") {
        prop_assert_eq!(featurizer().transform(&text), featurizer().transform(&text));
    }

    #[test]
    fn predict_never_fails_on_utf8(text in any::<String>()) {
        let prediction = predictor().predict(&text).unwrap();
        prop_assert!((0.0..=1.0).contains(&prediction.probability));
        prop_assert_eq!(prediction.is_spam, prediction.probability >= 0.5);
    }
}
