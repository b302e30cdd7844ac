use biogate_engine::fusion::TemplateFuser;
use biogate_engine::similarity::{face_similarity, GreedyMatcher, MinutiaeMatcher};
use biogate_engine::{FaceEncoding, MinutiaPoint, MinutiaType};
use proptest::prelude::*;

fn encoding() -> impl Strategy<Value = FaceEncoding> {
    prop::collection::vec(-10.0f32..10.0, 128).prop_map(FaceEncoding::new)
}

fn minutia() -> impl Strategy<Value = MinutiaPoint> {
    (0.0f32..500.0, 0.0f32..500.0, 0.0f32..360.0, any::<bool>(), 0.0f32..1.0).prop_map(
        |(x, y, angle, ending, quality)| MinutiaPoint {
            x,
            y,
            angle,
            kind: if ending {
                MinutiaType::RidgeEnding
            } else {
                MinutiaType::Bifurcation
            },
            quality,
        },
    )
}

fn minutiae(max: usize) -> impl Strategy<Value = Vec<MinutiaPoint>> {
    prop::collection::vec(minutia(), 0..max)
}

proptest! {
    #[test]
    fn face_similarity_is_symmetric(a in encoding(), b in encoding()) {
        prop_assert_eq!(face_similarity(&a, &b).unwrap(), face_similarity(&b, &a).unwrap());
    }

    #[test]
    fn face_similarity_is_bounded_and_maximal_on_self(a in encoding(), b in encoding()) {
        let s = face_similarity(&a, &b).unwrap();
        prop_assert!((0.0..=1.0).contains(&s));
        let own = face_similarity(&a, &a).unwrap();
        let zero = a.values().iter().all(|v| *v == 0.0);
        prop_assert!(zero || (own - 1.0).abs() < 1e-4);
    }

    #[test]
    fn fingerprint_similarity_is_bounded(a in minutiae(40), b in minutiae(40)) {
        let result = GreedyMatcher::default().match_points(&a, &b);
        prop_assert!((0.0..=1.0).contains(&result.similarity));
        prop_assert!(result.matched_points <= a.len().min(b.len()));
        if a.is_empty() || b.is_empty() {
            prop_assert_eq!(result.similarity, 0.0);
        }
    }

    #[test]
    fn small_jitter_still_matches(
        p in minutia(),
        dx in -6.5f32..6.5,
        dy in -6.5f32..6.5,
        da in -29.0f32..29.0,
    ) {
        let moved = MinutiaPoint {
            x: p.x + dx,
            y: p.y + dy,
            angle: (p.angle + da).rem_euclid(360.0),
            ..p
        };
        let result = GreedyMatcher::default().match_points(&[p], &[moved]);
        prop_assert_eq!(result.matched_points, 1);
    }

    #[test]
    fn large_offsets_never_match(p in minutia(), shift in 10.5f32..100.0, turn in 31.0f32..180.0) {
        let far = MinutiaPoint { x: p.x + shift, ..p };
        let turned = MinutiaPoint { angle: (p.angle + turn).rem_euclid(360.0), ..p };
        let matcher = GreedyMatcher::default();
        prop_assert_eq!(matcher.match_points(&[p], &[far]).matched_points, 0);
        prop_assert_eq!(matcher.match_points(&[p], &[turned]).matched_points, 0);
    }

    #[test]
    fn dedup_is_idempotent(points in minutiae(60)) {
        let fuser = TemplateFuser::default();
        let once = fuser.dedup(points);
        let twice = fuser.dedup(once.clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn dedup_leaves_no_close_pairs(points in minutiae(60)) {
        let fuser = TemplateFuser::default();
        let kept = fuser.dedup(points);
        for (i, a) in kept.iter().enumerate() {
            for b in &kept[i + 1..] {
                prop_assert!(a.distance(b) > fuser.dedup_tolerance);
            }
        }
    }
}
