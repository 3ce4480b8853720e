// ============================================================
// Layer 5 — Attention Masks
// ============================================================
// All masks are boolean tensors of rank 4 laid out as
//
//   [batch, 1, query_len, key_len]
//
// where `true` means "this key may be attended to". The head
// axis is always 1 and the query axis is 1 for padding masks;
// attention expands them to the full score shape.
//
// Masks are rebuilt for every batch from the token ids. Nothing
// is cached between calls.

use burn::{prelude::*, tensor::TensorData};

/// Keys holding `pad_id` are hidden. tokens: [batch, seq] → [batch, 1, 1, seq]
pub fn padding_mask<B: Backend>(tokens: Tensor<B, 2, Int>, pad_id: usize) -> Tensor<B, 4, Bool> {
    let [batch, seq_len] = tokens.dims();
    tokens
        .not_equal_elem(pad_id as i64)
        .reshape([batch, 1, 1, seq_len])
}

/// Query i may only see keys j ≤ i. → [1, 1, len, len]
pub fn causal_mask<B: Backend>(len: usize, device: &B::Device) -> Tensor<B, 4, Bool> {
    let mut allowed = Vec::with_capacity(len * len);
    for i in 0..len {
        for j in 0..len {
            allowed.push(j <= i);
        }
    }
    Tensor::from_data(TensorData::new(allowed, [1, 1, len, len]), device)
}

/// Decoder self-attention mask: causal AND padding. tokens: [batch, seq] → [batch, 1, seq, seq]
pub fn decoder_mask<B: Backend>(tokens: Tensor<B, 2, Int>, pad_id: usize) -> Tensor<B, 4, Bool> {
    let [batch, seq_len] = tokens.dims();
    let device  = tokens.device();
    let padding = padding_mask(tokens, pad_id)
        .expand([batch, 1, seq_len, seq_len])
        .int();
    let causal  = causal_mask::<B>(seq_len, &device)
        .expand([batch, 1, seq_len, seq_len])
        .int();
    (padding * causal).equal_elem(1)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use proptest::prelude::*;

    type TestBackend = NdArray;

    fn to_bools(mask: Tensor<TestBackend, 4, Bool>) -> Vec<bool> {
        mask.into_data().to_vec::<bool>().unwrap()
    }

    #[test]
    fn test_padding_mask_shape_and_values() {
        let device = Default::default();
        let tokens = Tensor::<TestBackend, 2, Int>::from_ints([[5, 7, 0], [0, 4, 0]], &device);
        let mask   = padding_mask(tokens, 0);
        assert_eq!(mask.dims(), [2, 1, 1, 3]);
        assert_eq!(to_bools(mask), vec![true, true, false, false, true, false]);
    }

    #[test]
    fn test_decoder_mask_with_trailing_pad() {
        // [sos, a, b, pad]
        let device = Default::default();
        let tokens = Tensor::<TestBackend, 2, Int>::from_ints([[2, 9, 11, 0]], &device);
        let mask   = decoder_mask(tokens, 0);
        assert_eq!(mask.dims(), [1, 1, 4, 4]);
        let expected = vec![
            true, false, false, false,
            true, true,  false, false,
            true, true,  true,  false,
            true, true,  true,  false,
        ];
        assert_eq!(to_bools(mask), expected);
    }

    #[test]
    fn test_decoder_mask_never_empties_a_row() {
        let device = Default::default();
        let tokens = Tensor::<TestBackend, 2, Int>::from_ints([[2, 0, 0], [2, 6, 0]], &device);
        let mask   = to_bools(decoder_mask(tokens, 0));
        for row in mask.chunks(3) {
            assert!(row.iter().any(|&v| v), "row fully masked: {row:?}");
        }
    }

    proptest! {
        #[test]
        fn prop_causal_mask_is_lower_triangular(len in 1usize..12) {
            let device = Default::default();
            let mask = to_bools(causal_mask::<TestBackend>(len, &device));
            for i in 0..len {
                for j in 0..len {
                    prop_assert_eq!(mask[i * len + j], j <= i);
                }
            }
        }

        #[test]
        fn prop_padding_mask_matches_tokens(ids in proptest::collection::vec(0i32..4, 1..16)) {
            let device = Default::default();
            let n = ids.len();
            let tokens = Tensor::<TestBackend, 2, Int>::from_data(
                TensorData::new(ids.clone(), [1, n]),
                &device,
            );
            let mask = to_bools(padding_mask(tokens, 0));
            for (m, id) in mask.iter().zip(ids.iter()) {
                prop_assert_eq!(*m, *id != 0);
            }
        }
    }
}
