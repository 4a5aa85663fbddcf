pub mod dam_archive;
