//! Chunking must never change what the decoder produces.

use proptest::prelude::*;
use scout_client::FrameDecoder;
use scout_types::StreamFrame;

fn decode(body: &[u8], cuts: &[usize]) -> Vec<StreamFrame> {
    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    let mut start = 0;
    for &cut in cuts {
        let cut = cut.clamp(start, body.len());
        frames.extend(decoder.feed(&body[start..cut]));
        start = cut;
    }
    frames.extend(decoder.feed(&body[start..]));
    frames.extend(decoder.finish());
    frames
}

fn frame_line() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 éü✓\\\\\"]{0,12}".prop_map(|s| {
            format!("data: {}\n", serde_json::json!({ "content": s }))
        }),
        "[a-z ]{1,8}".prop_map(|s| format!("data: {}\n", serde_json::json!({ "error": s }))),
        Just("data: {broken\n".to_string()),
        Just("\n".to_string()),
        Just(": comment\r\n".to_string()),
    ]
}

fn body() -> impl Strategy<Value = Vec<u8>> {
    (prop::collection::vec(frame_line(), 0..12), any::<bool>()).prop_map(|(lines, done)| {
        let mut body = lines.concat();
        if done {
            body.push_str("data: [DONE]\n");
            body.push_str("data: {\"content\":\"after\"}\n");
        }
        body.into_bytes()
    })
}

proptest! {
    #[test]
    fn chunk_boundaries_do_not_matter(
        body in body(),
        mut cuts in prop::collection::vec(0usize..400, 0..16),
    ) {
        cuts.sort_unstable();
        let whole = decode(&body, &[]);
        let chunked = decode(&body, &cuts);
        prop_assert_eq!(&whole, &chunked);
        prop_assert_eq!(whole.last(), Some(&StreamFrame::Done));
        prop_assert_eq!(whole.iter().filter(|f| f.is_done()).count(), 1);
    }

    #[test]
    fn byte_at_a_time_matches_whole(body in body()) {
        let cuts: Vec<usize> = (0..body.len()).collect();
        prop_assert_eq!(decode(&body, &[]), decode(&body, &cuts));
    }
}
