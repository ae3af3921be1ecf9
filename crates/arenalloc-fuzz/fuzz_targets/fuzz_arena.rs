#![no_main]
use arenalloc_core::{AllocError, ArenaAllocator, Engine, EngineKind};
use libfuzzer_sys::fuzz_target;

const REGION: usize = 64 * 1024;

fuzz_target!(|data: &[u8]| {
    // Byte 0 picks the engine; the rest is a sequence of 4-byte alloc/free ops.
    let Some((&selector, ops)) = data.split_first() else {
        return;
    };
    let engine = EngineKind::ALL[usize::from(selector) % EngineKind::ALL.len()];
    let Ok(mut arena) = Engine::create(engine, vec![0u8; REGION]) else {
        return;
    };
    let mut live = Vec::new();

    for chunk in ops.chunks_exact(4) {
        let tag = chunk[3];
        match chunk[0] % 3 {
            0 | 1 => {
                let size = usize::from(u16::from_le_bytes([chunk[1], chunk[2]])) % 6000;
                match arena.alloc(size) {
                    Ok(ptr) => {
                        arena.payload_mut(ptr, size).unwrap().fill(tag);
                        live.push((ptr, size, tag));
                    }
                    Err(AllocError::OutOfMemory { .. }) => {}
                    Err(AllocError::InvalidArgument { .. }) => assert_eq!(size, 0),
                    Err(err) => panic!("unexpected error: {err}"),
                }
            }
            _ => {
                if live.is_empty() {
                    continue;
                }
                let index = usize::from(chunk[1]) % live.len();
                let (ptr, size, tag) = live.swap_remove(index);
                assert!(
                    arena.payload(ptr, size).unwrap().iter().all(|&b| b == tag),
                    "live block overwritten"
                );
                arena.free(Some(ptr));
            }
        }
    }

    for (ptr, size, tag) in live {
        assert!(arena.payload(ptr, size).unwrap().iter().all(|&b| b == tag));
        arena.free(Some(ptr));
    }
    arena.destroy().unwrap();
});
