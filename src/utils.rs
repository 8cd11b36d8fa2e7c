/// Returns the only item of the collection, panicking if there are zero or several.
pub fn convert_to_one<T>(collection: impl IntoIterator<Item = T>) -> T {
    let mut iter = collection.into_iter();
    let out = iter.next().expect("Expect at least one item");
    if iter.next().is_some() {
        panic!("Collection has more than one item");
    }
    out
}

pub trait IteratorAllEqExt: Iterator {
    /// True if `f` maps every item to the same value. False for an empty iterator.
    fn all_eq<F, T>(self, f: F) -> bool
    where
        F: FnMut(Self::Item) -> T,
        T: Eq;
}

impl<I: Iterator> IteratorAllEqExt for I {
    fn all_eq<F, T>(mut self, mut f: F) -> bool
    where
        F: FnMut(Self::Item) -> T,
        T: Eq,
    {
        if let Some(head) = self.next() {
            let head = f(head);
            self.all(|val| f(val) == head)
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_eq() {
        assert!([3, 3, 3].iter().all_eq(|x| *x));
        assert!(![3, 4, 3].iter().all_eq(|x| *x));
        assert!(["a", "b"].iter().all_eq(|s| s.len()));
        assert!(!std::iter::empty::<u32>().all_eq(|x| x));
    }

    #[test]
    fn test_convert_to_one() {
        assert_eq!(convert_to_one(vec![7]), 7);
    }

    #[test]
    #[should_panic]
    fn test_convert_to_one_many() {
        convert_to_one(vec![1, 2]);
    }
}
