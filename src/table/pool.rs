use std::cell::RefCell;

use super::builder::TableBuilder;
use crate::config::BuilderConfig;

thread_local! {
    /// One idle builder per thread, reused across put operations.
    static CACHED: RefCell<Option<TableBuilder>> = const { RefCell::new(None) };
}

impl TableBuilder {
    /// Takes the calling thread's cached builder, or creates a new one.
    ///
    /// The returned builder is cleared and not collecting. Hand it back with
    /// [`recycle`](Self::recycle) once the record has been passed on.
    pub fn dequeue() -> TableBuilder {
        CACHED
            .try_with(|slot| slot.borrow_mut().take())
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    /// Clears `builder` and stores it as the calling thread's cached builder.
    ///
    /// If the thread already caches one, or `builder` was created with a non-default
    /// [`BuilderConfig`], it is dropped instead. [`dequeue`](Self::dequeue) only ever
    /// hands out builders that force defaults.
    pub fn recycle(mut builder: TableBuilder) {
        if builder.config() != &BuilderConfig::default() {
            return;
        }
        builder.clear();
        builder.set_collecting(false);

        // Fails only while the thread is being torn down; the builder is dropped then.
        let _ = CACHED.try_with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_none() {
                *slot = Some(builder);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recycled_builder_is_reused() {
        drop(TableBuilder::dequeue());
        let mut builder = TableBuilder::dequeue();
        builder.set_collecting(true);
        builder.prepare_string(&"x".repeat(4096)).unwrap();
        builder.collect_scalar(1_u8, 4).unwrap();
        builder.finish().unwrap();
        let capacity = builder.capacity();
        TableBuilder::recycle(builder);

        let reused = TableBuilder::dequeue();
        assert_eq!(reused.capacity(), capacity);
        assert!(reused.is_empty());
        assert!(!reused.did_start());
        assert!(!reused.is_collecting());

        // The slot is empty until the builder comes back.
        let fresh = TableBuilder::dequeue();
        assert!(fresh.is_empty());

        TableBuilder::recycle(reused);
        TableBuilder::recycle(fresh);
    }

    #[test]
    fn test_custom_config_is_not_cached() {
        drop(TableBuilder::dequeue());
        TableBuilder::recycle(TableBuilder::with_config(
            BuilderConfig::default().force_defaults(false),
        ));

        let mut builder = TableBuilder::dequeue();
        assert!(builder.config().force_defaults);
        builder.set_collecting(true);
        builder.collect_scalar(0_i32, 4).unwrap();
        let bytes = builder.finish().unwrap();
        assert_eq!(
            crate::TableReader::get_root(bytes).read_scalar::<i32>(4),
            Some(0)
        );
    }

    #[test]
    fn test_threads_have_separate_caches() {
        drop(TableBuilder::dequeue());
        let mut builder = TableBuilder::new();
        builder.set_collecting(true);
        builder.prepare_bytes(&[0; 8192]).unwrap();
        TableBuilder::recycle(builder);

        let other = std::thread::spawn(|| TableBuilder::dequeue().capacity())
            .join()
            .unwrap();
        assert!(other < 8192);

        assert!(TableBuilder::dequeue().capacity() >= 8192);
    }
}
