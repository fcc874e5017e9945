use alloy_primitives::{keccak256, B256};

/// Solidity function selector: first 4 bytes of keccak256 over the canonical signature.
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Topic0 of an event with the given canonical signature.
pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

/// Defines a static function selector for `$signature`.
/// Hashing isn't const, so the value is pinned and checked by a generated test.
#[macro_export]
macro_rules! define_selector {
    ($name:ident, $signature:literal, $v:expr) => {
        paste::paste! {
            pub const [<$name:snake:upper _SELECTOR>]: [u8; 4] = $v;

            #[cfg(test)]
            #[allow(non_snake_case)]
            mod [<$name:snake _selector_equality_test>] {
                #[test]
                fn [<it_tests_ $name:snake _selector_equality>]() {
                    assert_eq!($v, $crate::utils::function_selector($signature));
                }
            }
        }
    };
}

pub const ABI_WORD_SIZE: usize = 32;
