use proptest::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;
use vamos_mem_rs::core::memory::{
    AddressSpace, CpuState, LibraryDescriptor, LibraryDispatch, LibraryTrap, MainMemory, MemoryBlock,
    MemoryConfig, MemoryResult, StructLayout, Width, OP_RESET, OP_RTS,
};

const RAM_SIZE: u32 = 0x1_0000;

fn make_mem() -> MainMemory {
    MainMemory::with_config(&MemoryConfig::with_ram(RAM_SIZE), Box::new(CpuState::default)).unwrap()
}

fn width_strategy() -> impl Strategy<Value = Width> {
    prop_oneof![Just(Width::Byte), Just(Width::Word), Just(Width::Long)]
}

/// Blocos disjuntos: (gap antes, tamanho) em sequência
fn layout_strategy() -> impl Strategy<Value = Vec<(u32, u32)>> {
    prop::collection::vec((0u32..0x400, 1u32..0x400), 1..12)
}

#[derive(Default)]
struct VectorLog {
    vectors: RefCell<Vec<u32>>,
}

impl LibraryDispatch for VectorLog {
    fn call_vector(&self, vector: u32, _trap: &LibraryTrap, _mem: &mut MainMemory) -> MemoryResult<()> {
        self.vectors.borrow_mut().push(vector);
        Ok(())
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_resolve_finds_exactly_the_owning_range(layout in layout_strategy(), probe in 0u32..0x8000) {
        let mut space = AddressSpace::new(0x0100_0000);
        let mut begin = 0u32;
        for (i, (gap, size)) in layout.iter().enumerate() {
            begin += gap;
            let block = MemoryBlock::new(&format!("b{}", i), begin, *size).unwrap();
            space.register(Box::new(block)).unwrap();
            begin += size;
        }

        let owners: Vec<&str> = space.iter().filter(|r| r.contains(probe)).map(|r| r.name()).collect();
        prop_assert!(owners.len() <= 1);
        prop_assert_eq!(space.resolve(probe).map(|r| r.name()), owners.first().copied());
    }

    #[test]
    fn prop_write_then_read_returns_masked_value(
        width in width_strategy(),
        offset in 0u32..(RAM_SIZE - 4),
        value in any::<u32>(),
    ) {
        let mut mem = make_mem();
        mem.write_mem(width, offset, value);
        prop_assert_eq!(mem.read_mem(width, offset), value & width.mask());
        prop_assert!(!mem.force_quit());
    }

    #[test]
    fn prop_trap_reads_call_the_slot_vector(num_vectors in 1u32..40, pick in any::<prop::sample::Index>()) {
        let log = Rc::new(VectorLog::default());
        let layout = StructLayout::packed("lib", &[("lib_Flags", Width::Byte), ("lib_pad", Width::Byte)]).unwrap();
        let desc = LibraryDescriptor::with_vectors("test.library", num_vectors, layout, log.clone()).unwrap();

        let mut mem = make_mem();
        mem.space_mut().unregister("ram");
        let base = mem.add_library(0x2000, &desc).unwrap();

        let vector = pick.index(num_vectors as usize) as u32 + 1;
        let addr = base - vector * 6;
        prop_assert_eq!(mem.read_word(addr), OP_RTS as u32);
        prop_assert_eq!(log.vectors.borrow().clone(), vec![vector]);
        prop_assert!(!mem.force_quit());
    }

    #[test]
    fn prop_word_fetch_after_fault_is_reset(addr in RAM_SIZE..0x00FF_0000u32, fetch in 0u32..RAM_SIZE) {
        let mut mem = make_mem();
        mem.write_word(fetch & !1, 0x4E75);
        mem.read_byte(addr);
        prop_assert!(mem.force_quit());
        prop_assert_eq!(mem.collected_faults().len(), 1);
        prop_assert_eq!(mem.read_word(fetch & !1), OP_RESET as u32);
    }
}
