use rand::seq::SliceRandom;
use rand::Rng;

/// Returns a uniformly shuffled copy, drawing fresh entropy from the thread RNG.
pub fn shuffle<T: Clone>(items: &[T]) -> Vec<T> {
    shuffle_with(items, &mut rand::thread_rng())
}

pub fn shuffle_with<T: Clone, R: Rng + ?Sized>(items: &[T], rng: &mut R) -> Vec<T> {
    let mut shuffled = items.to_vec();
    shuffled.shuffle(rng);
    shuffled
}
