#![allow(dead_code)]

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ciborium::Value;
use fieldcrypt::document::doc;
use fieldcrypt::{
    ClassDef, CryptVault, DocumentEncryptor, FieldDef, FieldType, SchemaIndex, TypeRegistry, WalkMode,
};

pub const KEY_0: &str = "hqHKBLV83LpCqzKpf8OvutbCs+O5wX5BPu3btWpEvXA=";
pub const KEY_1: &str = "aic7QGYCCSHyy7gYRCyNTpPThbomw1/dtWl4bocyTnU=";
pub const KEY_2: &str = "IqWTpi549pJDZ1kuc9HppcMxtPfu2SP6Idlh+tz4LL4=";

pub fn key(encoded: &str) -> Vec<u8> {
    STANDARD.decode(encoded).unwrap()
}

/// A vault holding `KEY_0` as version 0.
pub fn vault() -> CryptVault {
    CryptVault::new().with_aes256_gcm_key(0, &key(KEY_0)).unwrap()
}

pub fn text(s: &str) -> Value {
    Value::Text(s.into())
}

pub fn int(n: i64) -> Value {
    Value::Integer(n.into())
}

pub fn sub_bean(plain: &str, secret: &str) -> Value {
    doc([("nonSensitiveData", text(plain)), ("secretString", text(secret))])
}

/// The persisted model used across the integration tests.
///
/// `MySubBean` refers back to `MyBean`, directly and through deeply nested
/// collections, so every schema build has to cut a cycle.
pub fn registry() -> TypeRegistry {
    let sub = || FieldType::class("MySubBean");
    let mut registry = TypeRegistry::new()
        .with_class(
            ClassDef::new("MyBean")
                .field(FieldDef::leaf("id").renamed("_id"))
                .field(FieldDef::leaf("nonSensitiveData"))
                .field(FieldDef::leaf("secretString").encrypted())
                .field(FieldDef::leaf("secretLong").encrypted())
                .field(FieldDef::leaf("secretBoolean").encrypted())
                .field(FieldDef::new("secretSubBean", sub()).encrypted())
                .field(FieldDef::new("publicStringList", FieldType::list(FieldType::Leaf)))
                .field(FieldDef::new("secretStringList", FieldType::list(FieldType::Leaf)).encrypted())
                .field(FieldDef::new("nonSensitiveSubBean", sub()))
                .field(FieldDef::new("nonSensitiveSubBeanList", FieldType::list(sub())))
                .field(FieldDef::new("nonSensitiveMap", FieldType::map(sub())))
                .field(FieldDef::new("secretMap", FieldType::map(sub())).encrypted())
                .field(FieldDef::new("nestedListMap", FieldType::map(FieldType::list(sub()))))
                .field(FieldDef::new("nestedListList", FieldType::list(FieldType::list(sub()))))
                .field(FieldDef::new(
                    "nestedListListNotEncrypted",
                    FieldType::list(FieldType::list(FieldType::class("MySubBeanNotEncrypted"))),
                ))
                .field(FieldDef::leaf("version")),
        )
        .with_class(
            ClassDef::new("MySubBean")
                .field(FieldDef::leaf("nonSensitiveData"))
                .field(FieldDef::leaf("secretString").encrypted())
                .field(FieldDef::new("recursiveBean", FieldType::class("MyBean")))
                .field(FieldDef::new(
                    "nestedCollectionsBean",
                    FieldType::list(FieldType::map(FieldType::list(FieldType::list(
                        FieldType::map(FieldType::class("MyBean")),
                    )))),
                )),
        )
        .with_class(
            ClassDef::new("MySubBeanNotEncrypted")
                .field(FieldDef::leaf("nonSensitiveData"))
                .field(FieldDef::leaf("nonSensitiveData2")),
        )
        .with_class(
            ClassDef::new("RenamedField")
                .field(FieldDef::leaf("someSecret").renamed("password").encrypted())
                .field(FieldDef::leaf("notSecret")),
        )
        .with_class(
            ClassDef::new("AbstractMyBean")
                .field(FieldDef::leaf("someSecret").encrypted())
                .field(FieldDef::leaf("notSecret")),
        )
        .with_class(
            ClassDef::new("Ssn")
                .extends("AbstractMyBean")
                .field(FieldDef::leaf("ssn").encrypted())
                .field(FieldDef::leaf("cached").transient()),
        )
        .with_class(ClassDef::new("Person").field(FieldDef::new("ssn", FieldType::class("Ssn"))))
        .with_class(ClassDef::new("AbstractSubObject"))
        .with_class(
            ClassDef::new("SubObject")
                .extends("AbstractSubObject")
                .field(FieldDef::leaf("field").encrypted()),
        )
        .with_class(
            ClassDef::new("TestObject")
                .field(FieldDef::new("list", FieldType::list(FieldType::class("AbstractSubObject")))),
        )
        .with_class(
            ClassDef::new("PlainBean")
                .field(FieldDef::leaf("nonSensitiveData"))
                .field(FieldDef::new("tags", FieldType::list(FieldType::Leaf))),
        );
    registry
        .register_discriminator("com.example.model.SubObject", "SubObject")
        .unwrap();
    registry
}

pub fn encryptor(vault: CryptVault, mode: WalkMode) -> DocumentEncryptor {
    let index = SchemaIndex::new(Arc::new(registry()));
    DocumentEncryptor::new(Arc::new(vault), Arc::new(index)).with_mode(mode)
}
