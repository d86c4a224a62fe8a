use borsh::{BorshDeserialize, BorshSerialize};

pub fn serialize<T: BorshSerialize>(item: &T) -> Vec<u8> {
    borsh::to_vec(item).expect("Primitive serialization can not fail")
}

pub fn deserialize<T: BorshDeserialize>(bytes: &[u8]) -> Result<T, borsh::io::Error> {
    borsh::from_slice(bytes)
}
