//! Property tests for record reassembly across arbitrary TCP read splits

use proptest::prelude::*;

use sensorgate_connectors::wire::{encode, RecordDecoder};
use sensorgate_core::Reading;

fn reading() -> impl Strategy<Value = Reading> {
    (any::<u16>(), -50.0f64..80.0, 0i64..2_000_000_000)
        .prop_map(|(id, value, ts)| Reading::new(id, value, ts))
}

proptest! {
    #[test]
    fn any_split_yields_the_same_records(
        readings in prop::collection::vec(reading(), 0..20),
        cuts in prop::collection::vec(1usize..40, 0..30),
    ) {
        let stream: Vec<u8> = readings.iter().flat_map(encode).collect();

        let mut decoder = RecordDecoder::new();
        let mut decoded = Vec::new();
        let mut offset = 0;
        for cut in cuts.into_iter().chain(std::iter::once(usize::MAX)) {
            if offset >= stream.len() {
                break;
            }
            let end = offset.saturating_add(cut).min(stream.len());
            decoder.feed(&stream[offset..end]);
            offset = end;
            while let Some(reading) = decoder.next_record() {
                decoded.push(reading);
            }
        }

        prop_assert_eq!(decoded, readings);
        prop_assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn truncated_stream_keeps_the_partial_tail(
        readings in prop::collection::vec(reading(), 1..10),
        drop_bytes in 1usize..18,
    ) {
        let stream: Vec<u8> = readings.iter().flat_map(encode).collect();
        let mut decoder = RecordDecoder::new();
        decoder.feed(&stream[..stream.len() - drop_bytes]);

        let decoded: Vec<Reading> = std::iter::from_fn(|| decoder.next_record()).collect();
        prop_assert_eq!(decoded.len(), readings.len() - 1);
        prop_assert_eq!(decoder.discard_partial(), 18 - drop_bytes);
    }
}
