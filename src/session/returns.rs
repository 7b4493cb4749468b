/// Discounted return-to-go for every step of a reward sequence.
///
/// `dones[k]` marks step `k` as the last step of a session: the return at
/// `k` only includes `rewards[k]`, and earlier steps do not see rewards
/// past `k`. Computed with a single backward scan:
///
/// ```text
/// G_k = r_k + gamma * G_{k+1}   (G_{k+1} = 0 when step k is done)
/// ```
///
/// Steps are paired positionally; when the slices differ in length the
/// result covers the shorter of the two.
pub fn discounted_returns(rewards: &[f32], dones: &[bool], gamma: f32) -> Vec<f32> {
    let len = rewards.len().min(dones.len());

    let mut returns = vec![0.0; len];
    let mut accumulator = 0.0;

    for (target, &reward, &done) in izip!(&mut returns, &rewards[..len], &dones[..len]).rev() {
        if done {
            accumulator = 0.0;
        }

        accumulator = reward + gamma * accumulator;
        *target = accumulator;
    }

    returns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_session() {
        let returns = discounted_returns(&[1.0, 1.0, 1.0], &[false, false, true], 0.5);

        assert_eq!(returns, vec![1.75, 1.5, 1.0]);
    }

    #[test]
    fn resets_after_each_session() {
        let returns = discounted_returns(
            &[1.0, 2.0, 1.0, 4.0],
            &[false, true, false, true],
            0.5,
        );

        assert_eq!(returns, vec![2.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn undiscounted() {
        let returns = discounted_returns(&[0.0, 1.0, 2.0], &[false, false, true], 1.0);

        assert_eq!(returns, vec![3.0, 3.0, 2.0]);
    }

    #[test]
    fn mismatched_lengths_use_the_shorter_slice() {
        assert_eq!(discounted_returns(&[1.0, 1.0], &[true], 0.5), vec![1.0]);
        assert_eq!(discounted_returns(&[1.0], &[false, true], 0.5), vec![1.0]);
    }

    #[test]
    fn empty() {
        assert!(discounted_returns(&[], &[], 0.9).is_empty());
    }
}
