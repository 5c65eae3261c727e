//! Library references inside contract code
//!
//! Contract code may link shared code through library cells: exotic cells
//! holding just the representation hash of the code they stand in for. The
//! code of such a contract only runs once every referenced library is
//! supplied, so callers need the set of hashes up front.

use std::collections::HashSet;

use tracing::trace;

use crate::cell::Cell;
use crate::prim::Bits256;

/// Hashes of every distinct library cell reachable from `code`, in
/// depth-first discovery order.
#[must_use]
pub fn find_libraries(code: &Cell) -> Vec<Bits256> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let mut visited = HashSet::new();
    let mut stack = vec![code];
    while let Some(cell) = stack.pop() {
        if !visited.insert(cell.hash()) {
            continue;
        }
        if let Some(hash) = cell.library_hash() {
            trace!(library = %hex::encode(hash), "found library reference");
            if seen.insert(hash) {
                out.push(Bits256(hash));
            }
            continue;
        }
        stack.extend(cell.refs().iter().rev().map(AsRef::as_ref));
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::builder::CellBuilder;
    use crate::cell::boc::{deserialize_base64, serialize_base64, BocOptions};
    use crate::cell::CellKind;

    fn library(byte: u8) -> Cell {
        let mut b = CellBuilder::exotic(CellKind::Library);
        b.store_uint(2, 8).unwrap();
        b.store_bytes(&[byte; 32]).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn single_library_cell() {
        let cell =
            deserialize_base64("te6ccgEBAQEAIwAIQgJYfMeJ7/HIT0bsN5fkX8gJoU/1riTx4MemqZzJ3JBh/w==")
                .unwrap();
        assert_eq!(
            find_libraries(&cell),
            vec!["587CC789EFF1C84F46EC3797E45FC809A14FF5AE24F1E0C7A6A99CC9DC9061FF"
                .parse::<Bits256>()
                .unwrap()]
        );
    }

    /// Contract code linking one library, as published on chain
    const LINKED_CODE: &str = concat!(
        "te6ccgECKAEAChkAART/APSkE/S88sgLAQIBYgIDAgLLDA0CASAEBQIBIAYHAgJxCgsCAesICQFf",
        "uM4e1E0PoA+kDU0z/UMGxB+ChZAnACcMjKAFjPFss/ySHIywET9AAS9ADLAMnbPIJwAfokO1E0Po",
        "A+kDU0z/UMGxBgJBoJ/goWXADcMjKABPMyy8BzxbJiCLIywH0APQAywDJ2zyHycCZa28/BREOCo4",
        "ABIIGogjiBss5CgDfQEoAmeLLGeLZgD9AWWX5JFkZYCJegB6AGWAZO2eQCYnASevFvaiaH0AfSBq",
        "aZ/qGC2/xCGYQCYCAUgODwKtp3wURAgSOCo4ABIIGogjiBss5CgDfQEoAmeLLGeLZgD9AWWX5JFk",
        "ZYCJegB6AGWAZJBtnmRADADlgoDnixF9ASAJu6gB5bXmZjiBYABJwCAZb2SA/YBAJicEzddtF2/Z",
        "BjgEkvgnAA6GmBgLjYSS+CcH0gfSAY/QAYuOuQ/QAY/QAYOdTaAAFpj4CA6Z+A9qJofQB9IGppn+",
        "oYE8EICzpYUF1xgRPBCD3uy+9dcYETwQgWO1y53XGBHJNBCCQgMyfdQQERITAfdntou370NMDMfp",
        "AMfpAMfoAMfQEMfoAMfoAMdM/MdMfMdIAAY4i0gABktQxjhnSAAGTddch3tIAAZNy1yHe9AQx9AQ",
        "x9AQx4t7SAFIClDHXTNCRMOIg10nBIJIwf+DTHzAgghAXjUUZupIwcOAgghAxmwzcupQwcNsx4CC",
        "JQDENzg5UVXHBfLgSQL6QPoA+gD6ADAgwgCXOVOAvPLgS5ZRkbzy4EvicCDIghAXjUUZAcsfUAYB",
        "yz8j+gIVywEjzxYB+gITywDJQXDwHlAEoEREA8hQBfoCUAPPFszLP8zJ7VQD2jc4ODgC+gD6QPgo",
        "iCNZcFRwACQQNRBHEDZZyFAG+gJQBM8WWM8WzAH6AssvySLIywES9AD0AMsAyds8UAfHBfLgSlEx",
        "oVE4SBNQdchQBfoCUAPPFszLP8zJ7VQB+kD0BDDIgBABywUm1wsBwwAmJxQBpl8FMjUCggiYloCg",
        "E7zy4EsC+kDTADCVyCHPFsmRbeLIgBgBywVQA88WcPoCcAHLaoIQ0XNUAAHLH1ADAcs/IvpEMMAA",
        "lTJwWMsB4w30AMmAQPsAFQT0jiE0NTc3UDXHBfLgTAH6QDBBM8hQBfoCUAPPFszLP8zJ7VTgJoIQ",
        "V3PR9bqOITEzNDY2USHHBfLgTQHUMFoUyFAF+gJQA88WzMs/zMntVOAmghA0rqYNuuMCJoIQHH+a",
        "GrrjAl8DNjYhghCOKrsjuuMCIYIQTw91ELoWFxgZAMaOM1AGzxZw+gLIghAxmwzcAcsfUAMByz9Q",
        "BPoCWM8WWM8WIm6TMosIkgLQ4hLPFslxWMtqzI4mMTMzAtcLAcMAlF8D2zHhWM8WcPoCcAHLaoIQ",
        "1TJ22wHLHwEByz/iyYBC+wACavgoiBAkcFRwACQQNRBHEDZZyFAG+gJQBM8WWM8WzAH6AssvySLI",
        "ywES9AD0AMsAyds8Es8WJicAYjQ1NzdRNccF8uBP9AQhbpExkwH7BOL0BDAgbpEwkTPiAshQBfoC",
        "UAPPFszLP8zJ7VQCcjYE0y/U0z8wIMAB8uBRIMAAjo8yIcABllsQODc0W+MNEDTjDaRQBEMTyFAF",
        "+gJQA88WzMs/zMntVBobAa4xMwLTP9MvMfgoQAMCcAJwyMoAWM8Wyz/JIcjLARP0ABL0AMsAyds8",
        "USLHBfLgTvpAMMiAGAHLBQHPFnD6AnABy2qCEMOfC+YByx9YAcs/Ac8WyYBC+wAnA/iPajHTP9Mv",
        "0z/4KFQgRwJwAnDIygBYzxbLP8khyMsBE/QAEvQAywDJ2zwUxwXy4E74IwG+8uD2AvoA+gD0BDAj",
        "wACOJjMzNEMTUyGgAXqpBLxZvLCOESBukTCbIPAFlIBA+wCRMOLikTDi4w7gNIIKIv3LuuMCXwSE",
        "D/LwJx0eBPgg0NMvIcIA8uD5gQ8QgggnjQAjvPL0+CMioAHUMPgoU6wCcAJwyMoAWM8Wyz/JIcjL",
        "ARP0ABL0AMsAySDbPPgoQ1BZcANwyMoAE8zLLwHPFsmIIsjLAfQA9ADLAMkg2zzIghBmr97yAcsf",
        "KgHLP1LAyz/JyIAYAcsFWM8WJx8nHAHeOjr4IyG58uD5gQ8Q+COCCCeNAKAivPL0+ChTaAJwAnDI",
        "ygBYzxbLP8khyMsBE/QAEvQAywDJINs8yIIQGC2N3QHLH1AGAcs/EssvGcs/GcxQBc8WyciAGAHL",
        "BVjPFnD6AkBmd1ADy2vMzMmAQPsAJwCiggkxLQD6All3UAPLa8zMyXD7AMiCEBgtjd0Byx9QCAHL",
        "P8svE8s/zFAHzxbJyIAYAcsFUAfPFnD6AkA2d1ADy2vMzFB2oXD7AgTJgwb7ABA0Arg1AsABj1MD",
        "0NMv1DD4KBJZcANwyMoAE8zLLwHPFsmIIsjLAfQA9ADLAMnbPMiAEAHLBQHPFnD6AnABy2qCEFf+",
        "NnIByx9QBAHLP8s/AfoCAfoCyYBA+wDbMeBfBR8nA/oC0z/4KEADAnACcMjKAFjPFss/ySHIywET",
        "9AAS9ADLAMnbPBLHBfLgTvpA0fgoiHBUcAAkEDUQRxA2WchQBvoCUATPFljPFswB+gLLL8kiyMsB",
        "EvQA9ADLAMnbPMiAGAHLBQHPFnD6AnABy2qCC5o3TgHLHwEByz/JgEL7ACcmJwEU/wD0pBP0vPLI",
        "CyACAWIhIgH40DPQ0wMBcbCSXwPg+kAD0x/TPyKCEGav3vK6jl80WzLtRNDSANTSL/pAJJnSANM/",
        "+gD6ADCVMHB/cCDiXwQD8tDzUULHBfLg9ALTPzB/cHAgEDcQNRA0ECMnyMoAF8wVyy9QA88WBZ1Q",
        "BMoAE8s/WPoCAfoCkl8E4sntVCMAPaGmO9qJoaQBqaRf9IBJM6QBpn/0AfQAYSpg4P7gQcUB/uAi",
        "ghBX/jZyuo5rNFsy7UTQ0gDU0i/6QCSZ0gDTP/oA+gAwlTBwf3Ag4luBDzEm8vQB8tL1UWHHBfLi",
        "9gTTP1JiuvLi9/oA+gAwEEYQNRAkf1UgJ8jKABfMFcsvUAPPFgWdUATKABPLP1j6AgH6ApJfBOLJ",
        "7VTgMAGCEHVGo00kAKq6jksD+kAx+gAxcdch+gAx+gAwc6m0AIIIW42AoBK+8uL47UTQyIAYAcsF",
        "WM8WcPoCyIIQ0bt0cQHLH1ADAcs/Ac8WyXFYy2rMyYBA+wDgXwSED/LwANqCENUydtu6lDBw2zHg",
        "IIIQ0XNUALqUMHDbMeAgghAYLY3dupQwcNsx4CCCEMOfC+a6lDBw2zHgIIIQV/42crqUMHDbMeAg",
        "gguaN066lDBw2zHgIIIQV/42crqUMHDbMeCCEGav3vK6k3DbMeB/CEICUECVEGUAGLhJ7uLB1sHs",
        "hkNDjOocWxt73bUMHthvgyoAGvkAcHTIywLKB8v/ydA=",
    );

    #[test]
    fn library_deep_inside_code() {
        let cell = deserialize_base64(LINKED_CODE).unwrap();
        assert_eq!(
            find_libraries(&cell),
            vec!["50409510650018b849eee2c1d6c1ec8643438cea1c5b1b7bddb50c1ed86f832a"
                .parse::<Bits256>()
                .unwrap()]
        );
    }

    #[test]
    fn published_code_reserializes_unchanged() {
        let cell = deserialize_base64(LINKED_CODE).unwrap();
        assert_eq!(serialize_base64(&cell, BocOptions::default()), LINKED_CODE);
    }

    #[test]
    fn distinct_in_discovery_order() {
        let mut inner = CellBuilder::new();
        inner.store_ref(library(2)).unwrap();
        inner.store_ref(library(1)).unwrap();
        let inner = inner.build().unwrap();
        let mut root = CellBuilder::new();
        root.store_uint(0xff, 8).unwrap();
        root.store_ref(inner).unwrap();
        root.store_ref(library(1)).unwrap();
        root.store_ref(library(3)).unwrap();
        let root = root.build().unwrap();
        assert_eq!(
            find_libraries(&root),
            vec![Bits256([2; 32]), Bits256([1; 32]), Bits256([3; 32])]
        );
        assert!(find_libraries(&Cell::empty()).is_empty());
    }
}
