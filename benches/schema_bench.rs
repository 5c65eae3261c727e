use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tlb::dynamic::Registry;
use tlb::prelude::*;
use tlb::schema::{compile_str, rust_module, CompileOptions, EmitOptions};

const SCHEMA: &str = "
    shard_ident$00 shard_pfx_bits:(#<= 60) workchain_id:int32 shard_prefix:uint64 = ShardIdent;
    ext_blk_ref$_ end_lt:uint64 seq_no:uint32 root_hash:bits256 file_hash:bits256 = ExtBlkRef;
    capabilities#c4 version:uint32 capabilities:uint64 = GlobalVersion;
    leaf$0 value:uint16 = Node;
    fork$1 left:^ExtBlkRef right:(Maybe ^ShardIdent) = Node;
    sample$_ shard:ShardIdent version:GlobalVersion nodes:(HashmapE 8 Node) = Sample;
";

fn compile_bench(c: &mut Criterion) {
    let opts = CompileOptions::default();
    c.bench_function("schema_compile", |bench| {
        bench.iter(|| black_box(compile_str(SCHEMA, &opts).unwrap()))
    });
    let defs = compile_str(SCHEMA, &opts).unwrap();
    c.bench_function("schema_emit", |bench| {
        bench.iter(|| black_box(rust_module(&defs, &EmitOptions::default())))
    });
}

fn engine_bench(c: &mut Criterion) {
    let registry = Registry::from_schema(compile_str(SCHEMA, &CompileOptions::default()).unwrap());
    let mut b = CellBuilder::new();
    b.store_uint(0, 2).unwrap();
    b.store_uint(0, 6).unwrap();
    b.store_int(-1, 32).unwrap();
    b.store_uint(0, 64).unwrap();
    b.store_uint(0xc4, 8).unwrap();
    b.store_uint(4, 32).unwrap();
    b.store_uint(0x2e, 64).unwrap();
    b.store_bit(false).unwrap();
    let cell = b.build().unwrap();
    c.bench_function("engine_decode_record", |bench| {
        bench.iter(|| black_box(registry.unmarshal("Sample", &cell).unwrap()))
    });
}

criterion_group!(benches, compile_bench, engine_bench);
criterion_main!(benches);
