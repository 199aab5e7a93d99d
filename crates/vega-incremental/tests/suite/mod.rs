mod class_storage;
mod lookup_storage;

use std::path::PathBuf;
use vega_metadata::{ClassProtoData, ProtoData};
use vega_storage::CacheDirectory;

pub fn cache_dir(tmp: &tempfile::TempDir, name: &str) -> CacheDirectory {
    CacheDirectory::open(tmp.path().join(name)).unwrap()
}

pub fn class(fq: &str, supertypes: &[&str]) -> ProtoData {
    let mut proto = ClassProtoData::new(fq);
    for supertype in supertypes {
        proto.supertypes.insert((*supertype).into());
    }
    ProtoData::Class(proto)
}

pub fn sealed_class(fq: &str, supertypes: &[&str]) -> ProtoData {
    let ProtoData::Class(mut proto) = class(fq, supertypes) else {
        unreachable!()
    };
    proto.is_sealed = true;
    ProtoData::Class(proto)
}

pub fn src(name: &str) -> PathBuf {
    PathBuf::from(format!("src/{name}"))
}
