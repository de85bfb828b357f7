use crate::rpc::RpcClient;
use chorus_types::{ChorusError, ChorusResult, RpcRequest, RpcResponse, ADD_SPAN};
use futures::future::try_join_all;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub count: usize,
}

pub fn spans(total: usize, span_size: usize) -> Vec<Span> {
    let mut spans = Vec::with_capacity(total.div_ceil(span_size));
    let mut start = 0;
    while start < total {
        let count = span_size.min(total - start);
        spans.push(Span { start, count });
        start += count;
    }
    spans
}

// Wrap a stage failure with the stage name, but let a structured chain
// break from deeper in the chain pass through untouched so the failed
// server's name survives to the head.
fn stage_err(stage: &str, err: ChorusError) -> ChorusError {
    match err {
        ChorusError::ChainBroken { .. } => err,
        other => ChorusError::Rpc(format!("{stage}: {other}")),
    }
}

/// Stage 1 of driving the downstream peer. Split out from the rest because
/// its failure triggers the skip-next decision before Idle is released.
pub async fn new_convo_round(client: &RpcClient, round: u32, route: &[String]) -> ChorusResult<()> {
    client
        .call(RpcRequest::NewRound {
            round,
            route: route.to_vec(),
        })
        .await
        .map(|_| ())
}

/// Stages 2-6: drive the downstream peer through its round with the shuffled
/// outgoing batch and collect its replies, one per sent onion. No retries;
/// the round either completes through this path or the error propagates.
pub async fn run_convo_round(
    client: &RpcClient,
    round: u32,
    onions: Vec<Vec<u8>>,
) -> ChorusResult<Vec<Vec<u8>>> {
    let total = onions.len();

    client
        .call(RpcRequest::Open {
            round,
            num_incoming: total as u32,
        })
        .await
        .map_err(|e| stage_err("Open", e))?;

    let spans = spans(total, ADD_SPAN);

    let mut remaining = onions.into_iter();
    let add_calls = spans.iter().map(|span| {
        let chunk: Vec<Vec<u8>> = remaining.by_ref().take(span.count).collect();
        client.call(RpcRequest::Add {
            round,
            offset: span.start as u32,
            onions: chunk,
        })
    });
    let add_calls: Vec<_> = add_calls.collect();
    try_join_all(add_calls)
        .await
        .map_err(|e| stage_err("Add", e))?;

    client
        .call(RpcRequest::Close { round })
        .await
        .map_err(|e| stage_err("Close", e))?;

    let get_calls: Vec<_> = spans
        .iter()
        .map(|span| {
            client.call(RpcRequest::Get {
                round,
                offset: span.start as u32,
                count: span.count as u32,
            })
        })
        .collect();
    let results = try_join_all(get_calls)
        .await
        .map_err(|e| stage_err("Get", e))?;

    let mut replies = Vec::with_capacity(total);
    for (span, result) in spans.iter().zip(results) {
        match result {
            RpcResponse::Onions(onions) if onions.len() == span.count => replies.extend(onions),
            RpcResponse::Onions(onions) => {
                return Err(ChorusError::Rpc(format!(
                    "Get: span at {} returned {} onions, expected {}",
                    span.start,
                    onions.len(),
                    span.count
                )))
            }
            RpcResponse::Ack => {
                return Err(ChorusError::Rpc("Get: unexpected ack".into()));
            }
        }
    }

    client
        .call(RpcRequest::Delete { round })
        .await
        .map_err(|e| stage_err("Delete", e))?;

    Ok(replies)
}
