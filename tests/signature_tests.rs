//! Signature identity tests
//!
//! - Equal inputs produce equal signatures and hashes
//! - Constants are keyed by value, parameters by type and shape
//! - Corpus cases produce their golden human strings

mod fixtures;

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use fixtures::SignatureCorpus;
use graphcache::{
    build_signature, Argument, CacheConfig, DataType, IdentityError, Literal, Signature, UnitName,
};

fn hash_of(signature: &Signature) -> u64 {
    let mut hasher = DefaultHasher::new();
    signature.hash(&mut hasher);
    hasher.finish()
}

#[test]
fn test_corpus_loads() {
    let corpus = SignatureCorpus::load().expect("corpus");
    assert_eq!(corpus.schema_version, 1);
    assert!(!corpus.cases.is_empty());
}

#[test]
fn test_corpus_human_strings() {
    let corpus = SignatureCorpus::load().expect("corpus");

    for case in corpus.cases.iter().filter(|c| c.human.is_some()) {
        let signature = build_signature(&case.unit_name(), &case.arguments())
            .unwrap_or_else(|e| panic!("{}: {}", case.id, e));
        assert_eq!(
            Some(signature.human_string()),
            case.human,
            "case {}",
            case.id
        );
    }
}

#[test]
fn test_corpus_rejections() {
    let corpus = SignatureCorpus::load().expect("corpus");

    for case in corpus.cases.iter().filter(|c| c.error.is_some()) {
        let err = build_signature(&case.unit_name(), &case.arguments())
            .expect_err(&case.id);
        let kind = match err {
            IdentityError::EmptyName => "empty_name",
            IdentityError::InvalidDimension { .. } => "invalid_dimension",
            IdentityError::UnhandledArgument { .. } => "unhandled_argument",
            IdentityError::MissingConstantValue { .. } => "missing_constant_value",
            _ => "other",
        };
        assert_eq!(Some(kind.to_string()), case.error, "case {}", case.id);
    }
}

#[test]
fn test_corpus_signatures_are_distinct() {
    let corpus = SignatureCorpus::load().expect("corpus");
    let fingerprints: HashSet<String> = corpus
        .cases
        .iter()
        .filter(|c| c.human.is_some())
        .map(|c| {
            build_signature(&c.unit_name(), &c.arguments())
                .unwrap()
                .fingerprint()
                .unwrap()
        })
        .collect();

    // resource and parameter args of the same type and shape coincide,
    // but no two corpus cases share a unit name
    let accepted = corpus.cases.iter().filter(|c| c.human.is_some()).count();
    assert_eq!(fingerprints.len(), accepted);
}

#[test]
fn test_equal_inputs_equal_hash() {
    let unit = UnitName::new("matmul").with_attr("transpose_a", "false");
    let a = build_signature(&unit, &fixtures::matmul_args(7)).unwrap();
    let b = build_signature(&unit.clone(), &fixtures::matmul_args(7)).unwrap();

    assert_eq!(a, b);
    assert_eq!(hash_of(&a), hash_of(&b));
    assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
}

#[test]
fn test_different_constant_differs() {
    let unit = fixtures::matmul();
    let a = build_signature(&unit, &fixtures::matmul_args(1)).unwrap();
    let b = build_signature(&unit, &fixtures::matmul_args(2)).unwrap();

    assert_ne!(a, b);
    assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
}

#[test]
fn test_parameter_values_do_not_matter() {
    // Only type and shape of a parameter reach the signature.
    let unit = UnitName::new("add");
    let a = build_signature(&unit, &[Argument::parameter(DataType::F32, vec![8])]).unwrap();
    let b = build_signature(
        &unit,
        &[Argument::parameter(DataType::F32, vec![8]).named("x")],
    )
    .unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_argument_order_matters() {
    let unit = UnitName::new("sub");
    let x = Argument::parameter(DataType::F32, vec![2]);
    let y = Argument::parameter(DataType::I32, vec![2]);

    let a = build_signature(&unit, &[x.clone(), y.clone()]).unwrap();
    let b = build_signature(&unit, &[y, x]).unwrap();
    assert_ne!(a, b);
}

#[test]
fn test_constant_resource_keyed_by_value() {
    let unit = UnitName::new("lookup");
    let a = build_signature(
        &unit,
        &[Argument::constant_resource(Literal::from_i32s(vec![2], &[1, 2]).unwrap())],
    )
    .unwrap();
    let b = build_signature(
        &unit,
        &[Argument::constant_resource(Literal::from_i32s(vec![2], &[1, 3]).unwrap())],
    )
    .unwrap();
    assert_ne!(a, b);
}

#[test]
fn test_cache_exposes_signature_builder() {
    let (cache, _) = fixtures::new_cache(CacheConfig::default());
    let via_cache = cache
        .build_signature(&fixtures::matmul(), &fixtures::matmul_args(3))
        .unwrap();
    let direct = build_signature(&fixtures::matmul(), &fixtures::matmul_args(3)).unwrap();
    assert_eq!(via_cache, direct);
}

#[test]
fn test_signature_builder_is_thread_safe() {
    let handles: Vec<_> = (0..8)
        .map(|_| {
            std::thread::spawn(|| {
                build_signature(&fixtures::matmul(), &fixtures::matmul_args(9))
                    .unwrap()
                    .fingerprint()
                    .unwrap()
            })
        })
        .collect();

    let fingerprints: HashSet<String> = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked"))
        .collect();
    assert_eq!(fingerprints.len(), 1);
}
