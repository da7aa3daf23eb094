shared::string_wrapper! { AssetName }
