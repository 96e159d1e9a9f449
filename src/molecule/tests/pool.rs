// Tests for slot recycling in the generic pool
#[cfg(test)]
mod pool_recycling {
    use crate::error::SimError;
    use crate::molecule::Pool;

    #[test]
    fn released_slots_wait_for_commit() {
        let mut pool: Pool<u32> = Pool::with_capacity("test", 2, 16).unwrap();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a, b);
        let mut born = pool.commit();
        born.sort();
        assert_eq!(born, vec![a.min(b), a.max(b)]);

        pool.release(a);
        // a is still in the graveyard, so growth hands out a fresh slot
        let c = pool.acquire().unwrap();
        assert_ne!(c, a);
        assert_eq!(pool.capacity(), 4);

        let born = pool.commit();
        assert_eq!(born, vec![c]);
        assert_eq!(pool.in_use(), 2);
        assert_eq!(pool.topd(), 2);
    }

    #[test]
    fn acquired_slots_are_reset() {
        let mut pool: Pool<u32> = Pool::with_capacity("test", 1, 4).unwrap();
        let a = pool.acquire().unwrap();
        *pool.get_mut(a) = 7;
        pool.commit();
        pool.release(a);
        pool.commit();
        let b = pool.acquire().unwrap();
        assert_eq!(b, a);
        assert_eq!(*pool.get(b), 0);
    }

    #[test]
    fn growth_stops_at_cap() {
        let mut pool: Pool<u32> = Pool::new("widgets", 3);
        for _ in 0..3 {
            pool.acquire().unwrap();
        }
        match pool.acquire() {
            Err(SimError::OutOfMemory { what, cap }) => {
                assert_eq!(what, "widgets");
                assert_eq!(cap, 3);
            }
            other => panic!("expected OutOfMemory, got {:?}", other),
        }
    }

    #[test]
    fn capacity_doubles() {
        let mut pool: Pool<u32> = Pool::new("test", 100);
        let mut caps = Vec::new();
        for _ in 0..9 {
            pool.acquire().unwrap();
            caps.push(pool.capacity());
        }
        assert_eq!(caps, vec![1, 2, 4, 4, 8, 8, 8, 8, 16]);
        assert_eq!(pool.commit().len(), 9);
        assert_eq!(pool.nd(), 7);
    }
}
