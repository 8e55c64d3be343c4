//! Small combinators over fallible streams.

use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};

struct GroupState<'a, T, E, F> {
    inner: BoxStream<'a, Result<T, E>>,
    pending: Option<T>,
    key_of: F,
    done: bool,
}

/// Group consecutive items with equal keys.
///
/// An error ends the stream; the partially collected group is dropped.
pub fn group_by<'a, T, E, K, F>(
    inner: BoxStream<'a, Result<T, E>>,
    key_of: F,
) -> BoxStream<'a, Result<Vec<T>, E>>
where
    T: Send + 'a,
    E: Send + 'a,
    K: PartialEq,
    F: Fn(&T) -> K + Send + 'a,
{
    let state = GroupState {
        inner,
        pending: None,
        key_of,
        done: false,
    };
    stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }
        let mut group: Vec<T> = st.pending.take().into_iter().collect();
        loop {
            match st.inner.next().await {
                Some(Ok(item)) => {
                    let same_group = group
                        .first()
                        .map_or(true, |first| (st.key_of)(first) == (st.key_of)(&item));
                    if !same_group {
                        st.pending = Some(item);
                        return Some((Ok(group), st));
                    }
                    group.push(item);
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.done = true;
                    if group.is_empty() {
                        return None;
                    }
                    return Some((Ok(group), st));
                }
            }
        }
    })
    .boxed()
}

/// Drain a stream and keep its last item.
pub async fn take_last<S, T, E>(stream: S) -> Result<Option<T>, E>
where
    S: Stream<Item = Result<T, E>>,
{
    stream
        .try_fold(None, |_, item| futures::future::ready(Ok(Some(item))))
        .await
}

/// Split a stream into `Vec`s of at most `size` items (`size` is at least 1).
pub fn batch<'a, T, E>(
    inner: BoxStream<'a, Result<T, E>>,
    size: usize,
) -> BoxStream<'a, Result<Vec<T>, E>>
where
    T: Send + 'a,
    E: Send + 'a,
{
    inner
        .try_chunks(size.max(1))
        .map_err(|e| e.1)
        .boxed()
}
