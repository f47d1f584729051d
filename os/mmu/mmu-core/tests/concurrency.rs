use mmu_core::{MemoryManager, Mmu, MmuConfig, MmuError, PhysicalAddress, VirtualAddress};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const PAGE_LEN: usize = 4096;
const PAGE: u64 = PAGE_LEN as u64;

fn manager() -> Arc<MemoryManager> {
    Arc::new(MemoryManager::new(
        MmuConfig::DEFAULT
            .with_phys_size(1024 * 1024)
            .with_virt_size(16 * 1024 * 1024),
    ))
}

#[test]
fn concurrent_allocations_are_disjoint_and_private() {
    let threads = 8;
    let mm = manager();
    let start = Arc::new(Barrier::new(threads));
    let held = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let mm = Arc::clone(&mm);
            let start = Arc::clone(&start);
            let held = Arc::clone(&held);
            thread::spawn(move || {
                let fill = [u8::try_from(t).unwrap() + 1; 2 * PAGE_LEN];
                start.wait();

                let va = mm.allocate(2 * PAGE).unwrap();
                mm.write(va, &fill).unwrap();

                // everyone holds an allocation at this point
                held.wait();
                assert_eq!(mm.read_vec(va, fill.len()).unwrap(), fill);

                held.wait();
                mm.release(va, 2 * PAGE).unwrap();
                va
            })
        })
        .collect();

    let addresses: Vec<VirtualAddress> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let distinct: HashSet<_> = addresses.iter().copied().collect();
    assert_eq!(distinct.len(), threads);

    assert_eq!(mm.with_mmu(Mmu::allocated_virtual_pages), Some(0));
}

#[test]
fn shared_translations_miss_once() {
    let threads = 8;
    let iters = 1_000;
    let mm = manager();
    let va = mm.allocate(PAGE).unwrap();
    let expected = {
        let pa = mm.translate(va).unwrap();
        mm.with_mmu(Mmu::flush_tlb).unwrap();
        pa
    };
    let before = mm.tlb_stats();
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let mm = Arc::clone(&mm);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..iters {
                    assert_eq!(mm.translate(va), Some(expected));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let after = mm.tlb_stats();
    assert_eq!(after.accesses - before.accesses, threads as u64 * iters);
    assert_eq!(after.misses - before.misses, 1);
}

#[test]
fn readers_see_whole_writes() {
    let mm = manager();
    let va = mm.allocate(3 * PAGE).unwrap();
    let len = 3 * PAGE_LEN;
    let start = Arc::new(Barrier::new(5));

    let writer = {
        let mm = Arc::clone(&mm);
        let start = Arc::clone(&start);
        thread::spawn(move || {
            start.wait();
            for round in 1..=50_u8 {
                mm.write(va, &vec![round; len]).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let mm = Arc::clone(&mm);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..50 {
                    let bytes = mm.read_vec(va, len).unwrap();
                    assert!(bytes.iter().all(|&b| b == bytes[0]), "torn read");
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(mm.read_vec(va, 1).unwrap(), [50]);
}

#[test]
fn release_does_not_race_readers_of_the_same_page() {
    let rounds = 2_000;
    let mm = manager();
    let va = VirtualAddress::new(PAGE);
    // root directory and leaf node come first, the data page is always reused
    let data_page = PhysicalAddress::new(2 * PAGE);
    let done = Arc::new(AtomicBool::new(false));
    let start = Arc::new(Barrier::new(4));

    let cycler = {
        let mm = Arc::clone(&mm);
        let done = Arc::clone(&done);
        let start = Arc::clone(&start);
        thread::spawn(move || {
            start.wait();
            for fill in (1..=u8::MAX).cycle().take(rounds) {
                assert_eq!(mm.allocate(PAGE).unwrap(), va);
                mm.write(va, &[fill; 16]).unwrap();
                mm.release(va, PAGE).unwrap();
            }
            done.store(true, Ordering::Release);
        })
    };

    let translator = {
        let mm = Arc::clone(&mm);
        let done = Arc::clone(&done);
        let start = Arc::clone(&start);
        thread::spawn(move || {
            start.wait();
            while !done.load(Ordering::Acquire) {
                if let Some(pa) = mm.translate(va) {
                    assert_eq!(pa, data_page);
                }
            }
        })
    };

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let mm = Arc::clone(&mm);
            let done = Arc::clone(&done);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                while !done.load(Ordering::Acquire) {
                    match mm.read_vec(va, 16) {
                        Err(e) => assert_eq!(e, MmuError::TranslationFault(va)),
                        Ok(bytes) => {
                            assert!(bytes.iter().all(|&b| b == bytes[0]), "torn read {bytes:?}");
                        }
                    }
                }
            })
        })
        .collect();

    cycler.join().unwrap();
    translator.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }

    assert_eq!(mm.translate(va), None);
    assert_eq!(mm.read_vec(va, 16), Err(MmuError::TranslationFault(va)));
    assert_eq!(mm.with_mmu(Mmu::allocated_virtual_pages), Some(0));
    assert_eq!(mm.with_mmu(Mmu::used_physical_pages), Some(2));
}
